//! Typed point-to-point operations on a context's world.

use crate::datatype::Datatype;
use crate::error::Result;
use crate::status::Status;
use crate::transport::Transport;

/// The world of a [`Context`](crate::Context), seen from the calling rank.
///
/// Every operation declares its element type through [`Datatype`], and the
/// transport rejects a receive whose type or count does not match the
/// incoming message.
pub struct Communicator<'a, T: Transport> {
    transport: &'a T,
}

impl<'a, T: Transport> Communicator<'a, T> {
    pub(crate) fn new(transport: &'a T) -> Self {
        Communicator { transport }
    }

    /// Get the rank of the calling participant.
    pub fn rank(&self) -> i32 {
        self.transport.rank()
    }

    /// Get the number of participants.
    pub fn size(&self) -> i32 {
        self.transport.size()
    }

    /// Get the processor name for this participant.
    pub fn processor_name(&self) -> Result<String> {
        self.transport.processor_name()
    }

    /// Synchronous send of `data` to `dest` on `tag`.
    ///
    /// Returns once `dest` has started the matching receive.
    pub fn send<D: Datatype>(&self, data: &[D], dest: i32, tag: i32) -> Result<()> {
        let mut payload = Vec::new();
        D::encode(data, &mut payload);
        self.transport
            .send_bytes(&payload, D::TAG, data.len(), dest, tag)
    }

    /// Blocking receive of exactly `data.len()` elements from `source` on `tag`.
    ///
    /// `data` is left untouched if the receive fails.
    pub fn recv<D: Datatype>(&self, data: &mut [D], source: i32, tag: i32) -> Result<Status> {
        let mut raw = vec![0u8; data.len() * D::TAG.size()];
        let status = self
            .transport
            .recv_bytes(&mut raw, D::TAG, data.len(), source, tag)?;
        D::decode(&raw, data);
        Ok(status)
    }
}
