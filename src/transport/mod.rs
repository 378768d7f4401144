//! Transports a [`Context`](crate::Context) can run on.
//!
//! A transport moves raw, already-encoded element bytes between ranks and is
//! responsible for rejecting a receive whose declaration does not match the
//! incoming message. Typed access goes through
//! [`Communicator`](crate::Communicator).
//!
//! - [`LocalWorld`]: every rank is a thread in the current process.
//! - `MpiTransport` (feature `mpi`): every rank is a process started by
//!   `mpiexec`/`srun`.

mod local;
#[cfg(feature = "mpi")]
mod mpi;

pub use local::{LocalTransport, LocalWorld};
#[cfg(feature = "mpi")]
pub use mpi::{MpiTransport, ThreadLevel};

use crate::datatype::DatatypeTag;
use crate::error::Result;
use crate::status::Status;

/// Point-to-point plumbing for one rank of a world.
pub trait Transport {
    /// Rank of the calling participant.
    fn rank(&self) -> i32;

    /// Number of participants in the world.
    fn size(&self) -> i32;

    /// Name of the host (or execution unit) this rank runs on.
    fn processor_name(&self) -> Result<String>;

    /// Synchronous send: returns once `dest` has matched the message with a
    /// receive. A receive that rejects the message does not complete it.
    ///
    /// `payload` holds `count` elements of `datatype`, encoded.
    fn send_bytes(
        &self,
        payload: &[u8],
        datatype: DatatypeTag,
        count: usize,
        dest: i32,
        tag: i32,
    ) -> Result<()>;

    /// Blocking receive of exactly `count` elements of `datatype` from
    /// `source` on `tag` into `buf` (`count * datatype.size()` bytes).
    ///
    /// The next message from `source` is checked against the declaration and
    /// left pending if it does not match. How much of the datatype check is
    /// possible depends on the transport: the local world compares tags, MPI
    /// can only tell element sizes apart, so a message of four `u8` passes as
    /// one `i32`.
    fn recv_bytes(
        &self,
        buf: &mut [u8],
        datatype: DatatypeTag,
        count: usize,
        source: i32,
        tag: i32,
    ) -> Result<Status>;

    /// Release the transport. Called at most once, by the owning context.
    fn finalize(&mut self) -> Result<()>;
}
