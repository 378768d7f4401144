//! MPI transport: each rank is a process of `MPI_COMM_WORLD`.

use std::marker::PhantomData;
use std::os::raw::{c_char, c_int};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::datatype::DatatypeTag;
use crate::error::{Error, Result};
use crate::ffi;
use crate::status::Status;
use crate::transport::Transport;
use crate::Context;

/// MPI can be initialized once per process
static MPI_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// MPI thread support levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ThreadLevel {
    /// Only single-threaded execution
    Single = 0,
    /// Multi-threaded, but MPI calls only from main thread
    Funneled = 1,
    /// Multi-threaded, but MPI calls serialized by user
    Serialized = 2,
    /// Full multi-threaded support
    Multiple = 3,
}

/// One rank of `MPI_COMM_WORLD`.
///
/// Not `Send`: MPI must be driven from the thread that initialized it.
pub struct MpiTransport {
    rank: i32,
    size: i32,
    thread_level: ThreadLevel,
    finalized: bool,
    _marker: PhantomData<*const ()>,
}

impl MpiTransport {
    /// Initialize MPI with the given thread support level.
    ///
    /// Fails with [`Error::AlreadyInitialized`] while MPI is running in this
    /// process, with [`Error::NotSupported`] once it has been finalized (MPI
    /// cannot restart), or with [`Error::Mpi`] if the runtime cannot start.
    pub fn init_thread(required: ThreadLevel) -> Result<Self> {
        if MPI_INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyInitialized);
        }
        if Self::is_finalized() {
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(Error::NotSupported(
                "MPI cannot be initialized again after MPI_Finalize".into(),
            ));
        }
        if Self::is_initialized() {
            // Started outside this crate; the guard stays with its owner
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(Error::AlreadyInitialized);
        }

        let mut provided: c_int = 0;
        let ret = unsafe { ffi::rankx_init_thread(required as c_int, &mut provided) };
        if ret != 0 {
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(mpi_error(ret));
        }

        let mut rank: i32 = 0;
        let mut size: i32 = 0;
        check(unsafe { ffi::rankx_comm_rank(&mut rank) })?;
        check(unsafe { ffi::rankx_comm_size(&mut size) })?;

        let thread_level = match provided {
            0 => ThreadLevel::Single,
            1 => ThreadLevel::Funneled,
            2 => ThreadLevel::Serialized,
            _ => ThreadLevel::Multiple,
        };
        debug!(rank, size, ?thread_level, "MPI initialized");

        Ok(MpiTransport {
            rank,
            size,
            thread_level,
            finalized: false,
            _marker: PhantomData,
        })
    }

    /// The thread support level the runtime provided.
    pub fn thread_level(&self) -> ThreadLevel {
        self.thread_level
    }

    /// The MPI library version string.
    pub fn version() -> Result<String> {
        // MPI_MAX_LIBRARY_VERSION_STRING is 8192 on MPICH
        let mut buf = vec![0u8; 8192];
        let mut len: i32 = 0;
        check(unsafe { ffi::rankx_get_version(buf.as_mut_ptr().cast::<c_char>(), &mut len) })?;
        utf8(&buf, len, "version string")
    }

    /// High-resolution wall-clock time in seconds.
    pub fn wtime() -> f64 {
        unsafe { ffi::rankx_wtime() }
    }

    /// Whether `MPI_Init` has run in this process.
    pub fn is_initialized() -> bool {
        let mut flag: c_int = 0;
        unsafe { ffi::rankx_initialized(&mut flag) };
        flag != 0
    }

    /// Whether `MPI_Finalize` has run in this process.
    pub fn is_finalized() -> bool {
        let mut flag: c_int = 0;
        unsafe { ffi::rankx_finalized(&mut flag) };
        flag != 0
    }
}

impl Context<MpiTransport> {
    /// Initialize MPI (single-threaded) and wrap `MPI_COMM_WORLD` in a context.
    pub fn init_mpi() -> Result<Self> {
        Ok(Context::new(MpiTransport::init_thread(ThreadLevel::Single)?))
    }
}

fn check(code: c_int) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(mpi_error(code))
    }
}

fn mpi_error(code: c_int) -> Error {
    let mut buf = vec![0u8; 1024];
    let mut len: i32 = 0;
    let ret = unsafe { ffi::rankx_error_string(code, buf.as_mut_ptr().cast::<c_char>(), &mut len) };
    let message = if ret == 0 {
        utf8(&buf, len, "error string").unwrap_or_else(|_| "unknown error".to_string())
    } else {
        "unknown error".to_string()
    };
    Error::Mpi { code, message }
}

fn utf8(buf: &[u8], len: i32, what: &str) -> Result<String> {
    let len = (len.max(0) as usize).min(buf.len());
    std::str::from_utf8(&buf[..len])
        .map(|s| s.trim_end_matches('\0').trim_end().to_string())
        .map_err(|_| Error::Internal(format!("invalid UTF-8 in MPI {what}")))
}

impl Transport for MpiTransport {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn processor_name(&self) -> Result<String> {
        // MPI_MAX_PROCESSOR_NAME is at most 256 on common implementations
        let mut buf = vec![0u8; 1024];
        let mut len: i32 = 0;
        check(unsafe {
            ffi::rankx_get_processor_name(buf.as_mut_ptr().cast::<c_char>(), &mut len)
        })?;
        utf8(&buf, len, "processor name")
    }

    fn send_bytes(
        &self,
        payload: &[u8],
        datatype: DatatypeTag,
        count: usize,
        dest: i32,
        tag: i32,
    ) -> Result<()> {
        if dest < 0 || dest >= self.size {
            return Err(Error::InvalidRank(dest));
        }
        if tag < 0 {
            return Err(Error::InvalidTag(tag));
        }
        if payload.len() != count * datatype.size() {
            return Err(Error::InvalidBuffer(format!(
                "{} bytes for {count} {datatype:?} element(s)",
                payload.len()
            )));
        }

        trace!(rank = self.rank, dest, tag, count, "MPI_Ssend");
        check(unsafe {
            ffi::rankx_ssend(
                payload.as_ptr().cast(),
                count as i64,
                datatype as i32,
                dest,
                tag,
            )
        })
    }

    fn recv_bytes(
        &self,
        buf: &mut [u8],
        datatype: DatatypeTag,
        count: usize,
        source: i32,
        tag: i32,
    ) -> Result<Status> {
        if source < 0 || source >= self.size {
            return Err(Error::InvalidRank(source));
        }
        if tag < 0 {
            return Err(Error::InvalidTag(tag));
        }
        if buf.len() != count * datatype.size() {
            return Err(Error::InvalidBuffer(format!(
                "{} bytes for {count} {datatype:?} element(s)",
                buf.len()
            )));
        }

        let mut actual_source: i32 = 0;
        let mut actual_tag: i32 = 0;
        let mut actual_count: i64 = 0;
        trace!(rank = self.rank, source, tag, count, "MPI_Recv");
        let ret = unsafe {
            ffi::rankx_recv(
                buf.as_mut_ptr().cast(),
                count as i64,
                datatype as i32,
                source,
                tag,
                &mut actual_source,
                &mut actual_tag,
                &mut actual_count,
            )
        };

        match ret {
            0 => Ok(Status {
                source: actual_source,
                tag: actual_tag,
                count: actual_count,
            }),
            ffi::RANKX_ERR_DATATYPE => Err(Error::DatatypeMismatch {
                expected: datatype,
                found: None,
            }),
            ffi::RANKX_ERR_COUNT => Err(Error::CountMismatch {
                expected: count,
                actual: actual_count,
            }),
            ffi::RANKX_ERR_TAG => Err(Error::TagMismatch {
                expected: tag,
                actual: actual_tag,
            }),
            code => Err(mpi_error(code)),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        let ret = unsafe { ffi::rankx_finalize() };
        MPI_INITIALIZED.store(false, Ordering::SeqCst);
        debug!(rank = self.rank, "MPI finalized");
        check(ret)
    }
}
