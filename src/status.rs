//! Message status information.

/// Envelope of a completed receive.
///
/// Returned by [`Communicator::recv`](crate::Communicator::recv).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Number of elements in the message.
    pub count: i64,
}
