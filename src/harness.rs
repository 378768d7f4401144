//! The rank exchange: one byte from rank 0's file state to rank 1.
//!
//! Each participant runs the same sequence, branching once on its [`Role`]:
//!
//! 1. check the world has exactly two participants
//! 2. open `rank{rank}.txt` fresh (create + truncate, read/write)
//! 3. read one byte into a buffer that starts out as the configured seed
//! 4. the sender sends the buffer to rank 1; the receiver receives into it
//! 5. write the buffer back to the file
//! 6. tear down the context
//!
//! Opening truncates, so step 3 normally reads nothing. An empty read is not
//! an error: the buffer keeps the seed (default [`TransferUnit::SENTINEL`]),
//! and that seed is what travels to rank 1.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::datatype::TransferUnit;
use crate::error::{Error, Result};
use crate::status::Status;
use crate::transport::Transport;
use crate::Context;

/// Participants in an exchange.
pub const WORLD_SIZE: i32 = 2;
/// Rank that produces the transfer unit.
pub const SENDER_RANK: i32 = 0;
/// Rank that consumes the transfer unit.
pub const RECEIVER_RANK: i32 = 1;
/// Tag the rendezvous is matched on.
pub const EXCHANGE_TAG: i32 = 0;

/// What a participant does in the rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Rank 0: sends its buffer
    Sender,
    /// Rank 1: receives into its buffer
    Receiver,
}

impl Role {
    /// Resolve the role of `rank`.
    pub fn from_rank(rank: i32) -> Result<Self> {
        match rank {
            SENDER_RANK => Ok(Role::Sender),
            RECEIVER_RANK => Ok(Role::Receiver),
            other => Err(Error::InvalidRank(other)),
        }
    }

    /// Own rank.
    pub fn rank(self) -> i32 {
        match self {
            Role::Sender => SENDER_RANK,
            Role::Receiver => RECEIVER_RANK,
        }
    }

    /// Rank on the other side of the rendezvous.
    pub fn peer(self) -> i32 {
        match self {
            Role::Sender => RECEIVER_RANK,
            Role::Receiver => SENDER_RANK,
        }
    }
}

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Directory holding the `rank{N}.txt` files.
    pub dir: PathBuf,
    /// Value the buffer holds before the read.
    pub seed: TransferUnit,
    /// Tag the rendezvous is matched on.
    pub tag: i32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            dir: PathBuf::from("."),
            seed: TransferUnit::SENTINEL,
            tag: EXCHANGE_TAG,
        }
    }
}

impl HarnessConfig {
    /// Set the file directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the initial buffer value.
    pub fn with_seed(mut self, seed: TransferUnit) -> Self {
        self.seed = seed;
        self
    }

    /// Set the rendezvous tag.
    pub fn with_tag(mut self, tag: i32) -> Self {
        self.tag = tag;
        self
    }

    /// Path of `rank`'s file.
    pub fn file_path(&self, rank: i32) -> PathBuf {
        self.dir.join(format!("rank{rank}.txt"))
    }
}

/// A participant's file, opened fresh for reading and writing.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    file: File,
}

impl LocalFile {
    /// Create or truncate `path` and open it read/write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        debug!(path = %path.display(), "opened participant file");
        Ok(LocalFile { path, file })
    }

    /// Read one byte at the current position; `None` at end of file.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.file.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::io(&self.path, e)),
            }
        }
    }

    /// Write one byte at the current position and flush it.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.file
            .write_all(&[byte])
            .and_then(|()| self.file.flush())
            .map_err(|e| Error::io(&self.path, e))
    }

    /// Current length of the file in bytes.
    pub fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::io(&self.path, e))
    }

    /// Whether the file holds no bytes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Current read/write position.
    pub fn position(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| Error::io(&self.path, e))
    }

    /// Path the file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What one participant did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// The participant's role.
    pub role: Role,
    /// File the buffer was read from and written to.
    pub path: PathBuf,
    /// Byte read from the file, `None` when it was empty.
    pub read: Option<u8>,
    /// Buffer after the rendezvous; this is what was written back.
    pub buffer: TransferUnit,
    /// Envelope of the received message (receiver only).
    pub status: Option<Status>,
}

/// One participant's view of the exchange.
pub struct Harness<'a, T: Transport> {
    context: &'a Context<T>,
    role: Role,
    config: &'a HarnessConfig,
}

impl<'a, T: Transport> Harness<'a, T> {
    /// Check the world and resolve this participant's role.
    ///
    /// Fails with [`Error::InvalidWorldSize`] unless the world has exactly two
    /// participants.
    pub fn initialize(context: &'a Context<T>, config: &'a HarnessConfig) -> Result<Self> {
        let size = context.size();
        if size != WORLD_SIZE {
            return Err(Error::InvalidWorldSize {
                size,
                expected: WORLD_SIZE,
            });
        }
        let role = Role::from_rank(context.rank())?;
        debug!(rank = role.rank(), ?role, "harness initialized");
        Ok(Harness {
            context,
            role,
            config,
        })
    }

    /// This participant's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Open this participant's file fresh.
    pub fn open_local_file(&self) -> Result<LocalFile> {
        LocalFile::open(self.config.file_path(self.role.rank()))
    }

    /// The rendezvous: the sender hands `buffer` to its peer and keeps it;
    /// the receiver replaces it with the peer's unit.
    pub fn transfer(&self, buffer: TransferUnit) -> Result<(TransferUnit, Option<Status>)> {
        let world = self.context.world();
        let peer = self.role.peer();
        match self.role {
            Role::Sender => {
                world.send(&[buffer], peer, self.config.tag)?;
                debug!(peer, unit = %buffer, "sent transfer unit");
                Ok((buffer, None))
            }
            Role::Receiver => {
                let mut received = [buffer];
                let status = world.recv(&mut received, peer, self.config.tag)?;
                debug!(peer, unit = %received[0], "received transfer unit");
                Ok((received[0], Some(status)))
            }
        }
    }

    /// Steps 2-5: open, read, rendezvous, write.
    pub fn run(&self) -> Result<Report> {
        let mut file = self.open_local_file()?;

        let read = file.read_byte()?;
        let buffer = match read {
            Some(byte) => TransferUnit(byte),
            None => {
                warn!(
                    path = %file.path().display(),
                    seed = %self.config.seed,
                    "participant file is empty, keeping seed"
                );
                self.config.seed
            }
        };

        let (buffer, status) = self.transfer(buffer)?;
        file.write_byte(buffer.get())?;

        info!(rank = self.role.rank(), role = ?self.role, unit = %buffer, "exchange complete");
        Ok(Report {
            role: self.role,
            path: file.path().to_path_buf(),
            read,
            buffer,
            status,
        })
    }
}

/// Run the whole exchange for one participant and tear its context down.
///
/// Teardown happens on every path, including a rejected world size; the
/// first error wins.
pub fn execute<T: Transport>(context: Context<T>, config: &HarnessConfig) -> Result<Report> {
    let outcome = Harness::initialize(&context, config).and_then(|harness| harness.run());
    let teardown = context.finalize();
    match (outcome, teardown) {
        (Ok(report), Ok(())) => Ok(report),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}
