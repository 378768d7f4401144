//! Error types for rank-exchange

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::datatype::DatatypeTag;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for exchange operations
#[derive(Error, Debug)]
pub enum Error {
    /// The MPI runtime has already been initialized in this process
    #[error("MPI has already been initialized")]
    AlreadyInitialized,

    /// The world does not have exactly the number of participants required
    #[error("world has {size} participants, the exchange needs exactly {expected}")]
    InvalidWorldSize {
        /// Participants reported by the transport
        size: i32,
        /// Participants the exchange requires
        expected: i32,
    },

    /// A rank outside the world was addressed
    #[error("invalid rank: {0}")]
    InvalidRank(i32),

    /// A negative message tag was used
    #[error("invalid tag: {0}")]
    InvalidTag(i32),

    /// A buffer's length does not match its declared element count
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Text that does not describe a single byte
    #[error("invalid transfer unit: {0}")]
    InvalidUnit(String),

    /// A participant file could not be opened, read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File the operation was addressed to
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The incoming message carries a different element type than the receive declares.
    ///
    /// Under MPI only a difference in element size is detected, and `found`
    /// is `None`; the local world reports the exact type.
    #[error("datatype mismatch: receive expects {expected:?}, message carries {}", describe(*found))]
    DatatypeMismatch {
        /// Type declared by the receive
        expected: DatatypeTag,
        /// Type of the incoming message, when the transport carries it
        found: Option<DatatypeTag>,
    },

    /// The incoming message carries a different number of elements than requested
    #[error("count mismatch: receive expects {expected} element(s), message carries {actual}")]
    CountMismatch {
        /// Elements requested by the receive
        expected: usize,
        /// Elements in the incoming message
        actual: i64,
    },

    /// The next message from the source was sent on a different tag
    #[error("tag mismatch: receive expects tag {expected}, message has tag {actual}")]
    TagMismatch {
        /// Tag requested by the receive
        expected: i32,
        /// Tag of the incoming message
        actual: i32,
    },

    /// The peer tore down its context before the rendezvous completed
    #[error("peer rank {peer} disconnected")]
    PeerDisconnected {
        /// Rank of the vanished peer
        peer: i32,
    },

    /// Operation not supported by this transport
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// MPI error with code and the runtime's message
    #[error("MPI error (code {code}): {message}")]
    Mpi {
        /// Raw MPI error code
        code: i32,
        /// Text from `MPI_Error_string`
        message: String,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

fn describe(found: Option<DatatypeTag>) -> String {
    match found {
        Some(tag) => format!("{tag:?}"),
        None => "a type of a different size".to_string(),
    }
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors a receive raises when the message does not match its declaration.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::DatatypeMismatch { .. } | Error::CountMismatch { .. } | Error::TagMismatch { .. }
        )
    }
}
