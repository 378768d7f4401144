//! # rank-exchange
//!
//! A two-participant rank exchange: rank 0 reads a byte from its file, hands
//! it to rank 1 through a synchronous point-to-point rendezvous, and each
//! rank writes its byte back to its own file.
//!
//! The crate provides:
//! - [`Context`]: the distributed context, an explicit handle threaded
//!   through every operation and torn down exactly once
//! - [`Communicator`]: typed send/receive over any [`Transport`]
//! - [`LocalWorld`]: an in-process world where each rank is a thread
//! - `MpiTransport` (feature `mpi`): `MPI_COMM_WORLD` through a thin C shim
//! - [`harness`]: the exchange itself
//! - [`launcher`]: rank/size as advertised by `mpiexec` or SLURM
//!
//! ## Quick Start
//!
//! ```
//! use rank_exchange::harness::{self, HarnessConfig};
//! use rank_exchange::{LocalWorld, TransferUnit};
//!
//! fn main() -> Result<(), rank_exchange::Error> {
//!     let dir = std::env::temp_dir().join(format!("rankx-doc-{}", std::process::id()));
//!     std::fs::create_dir_all(&dir).unwrap();
//!     let config = HarnessConfig::default()
//!         .with_dir(&dir)
//!         .with_seed(TransferUnit(b'X'));
//!
//!     let reports = std::thread::scope(|s| {
//!         let handles: Vec<_> = LocalWorld::bootstrap(2)?
//!             .into_iter()
//!             .map(|context| {
//!                 let config = &config;
//!                 s.spawn(move || harness::execute(context, config))
//!             })
//!             .collect();
//!         handles
//!             .into_iter()
//!             .map(|h| h.join().unwrap())
//!             .collect::<Result<Vec<_>, rank_exchange::Error>>()
//!     })?;
//!
//!     assert_eq!(reports[1].buffer, TransferUnit(b'X'));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `mpi`   | MPI transport via `csrc/rankx.c` | `cc`, `pkg-config` (build) |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod comm;
mod datatype;
mod error;
#[cfg(feature = "mpi")]
#[allow(missing_docs)]
mod ffi;
pub mod harness;
pub mod launcher;
mod status;
pub mod transport;

pub use comm::Communicator;
pub use datatype::{Datatype, DatatypeTag, TransferUnit};
pub use error::{Error, Result};
pub use status::Status;
#[cfg(feature = "mpi")]
pub use transport::{MpiTransport, ThreadLevel};
pub use transport::{LocalTransport, LocalWorld, Transport};

use tracing::{debug, warn};

/// A distributed context: one participant's handle on its world.
///
/// Created by [`LocalWorld::bootstrap`], `Context::init_mpi` (feature `mpi`)
/// or [`Context::new`] around any [`Transport`]. The transport is finalized
/// exactly once: by [`finalize`](Self::finalize), or on drop if that was
/// never called.
pub struct Context<T: Transport> {
    transport: T,
    finalized: bool,
}

impl<T: Transport> Context<T> {
    /// Wrap an initialized transport.
    pub fn new(transport: T) -> Self {
        Context {
            transport,
            finalized: false,
        }
    }

    /// Rank of the calling participant.
    pub fn rank(&self) -> i32 {
        self.transport.rank()
    }

    /// Number of participants in the world.
    pub fn size(&self) -> i32 {
        self.transport.size()
    }

    /// Typed point-to-point access to the world.
    pub fn world(&self) -> Communicator<'_, T> {
        Communicator::new(&self.transport)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Tear down the context, reporting any transport error.
    pub fn finalize(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        debug!(rank = self.transport.rank(), "tearing down context");
        self.transport.finalize()
    }
}

impl<T: Transport> Drop for Context<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "context teardown failed");
        }
    }
}
