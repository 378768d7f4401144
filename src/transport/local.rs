//! In-process world: each rank is a thread, each ordered rank pair a
//! zero-capacity channel.
//!
//! A zero-capacity channel hands a message over only when the receiver takes
//! it. The sender then waits on the message's acknowledgement, which the
//! receiver sends once it has matched and copied the payload, so
//! `send_bytes` returns only after a matching receive, as `MPI_Ssend` does.
//! Messages between one pair of ranks are delivered in order; a receive checks
//! the next message from its source and fails if the tag, datatype or count
//! differ from what it declared. A rejected message stays pending, its sender
//! still blocked, and is offered to the next receive from that source.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::trace;

use crate::datatype::DatatypeTag;
use crate::error::{Error, Result};
use crate::status::Status;
use crate::transport::Transport;
use crate::Context;

/// One message in flight.
#[derive(Debug)]
struct Envelope {
    tag: i32,
    datatype: DatatypeTag,
    count: usize,
    payload: Vec<u8>,
    /// Signalled once a matching receive has copied the payload. Dropped
    /// unsignalled if the receiver tears down first.
    ack: Sender<()>,
}

/// Builder for an in-process world.
///
/// # Example
///
/// ```
/// use rank_exchange::{LocalWorld, TransferUnit};
///
/// let mut contexts = LocalWorld::bootstrap(2).unwrap();
/// let receiver = contexts.pop().unwrap();
/// let sender = contexts.pop().unwrap();
///
/// std::thread::scope(|s| {
///     s.spawn(|| sender.world().send(&[TransferUnit(b'X')], 1, 0).unwrap());
///     let mut buf = [TransferUnit::SENTINEL];
///     receiver.world().recv(&mut buf, 0, 0).unwrap();
///     assert_eq!(buf[0], TransferUnit(b'X'));
/// });
/// ```
pub struct LocalWorld;

impl LocalWorld {
    /// Create `size` connected contexts, ordered by rank.
    pub fn bootstrap(size: i32) -> Result<Vec<Context<LocalTransport>>> {
        Ok(Self::transports(size)?
            .into_iter()
            .map(Context::new)
            .collect())
    }

    /// Create `size` connected transports, ordered by rank.
    pub fn transports(size: i32) -> Result<Vec<LocalTransport>> {
        if size < 1 {
            return Err(Error::NotSupported(format!(
                "a local world needs at least one rank, got {size}"
            )));
        }
        let n = size as usize;

        // outboxes[src][dest] pairs with inboxes[dest][src]
        let mut outboxes: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        for src in 0..n {
            for dest in (0..n).filter(|&dest| dest != src) {
                let (tx, rx) = bounded(0);
                outboxes[src][dest] = Some(tx);
                inboxes[dest][src] = Some(rx);
            }
        }

        Ok(outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalTransport {
                rank: rank as i32,
                size,
                outboxes,
                pending: inboxes.iter().map(|_| Mutex::new(None)).collect(),
                inboxes,
            })
            .collect())
    }
}

/// One rank of a [`LocalWorld`].
pub struct LocalTransport {
    rank: i32,
    size: i32,
    /// Indexed by destination rank
    outboxes: Vec<Option<Sender<Envelope>>>,
    /// Indexed by source rank
    inboxes: Vec<Option<Receiver<Envelope>>>,
    /// Message a receive rejected, per source rank
    pending: Vec<Mutex<Option<Envelope>>>,
}

impl LocalTransport {
    fn check_peer(&self, peer: i32) -> Result<usize> {
        if peer < 0 || peer >= self.size {
            return Err(Error::InvalidRank(peer));
        }
        if peer == self.rank {
            return Err(Error::NotSupported(format!(
                "rank {peer} cannot exchange with itself in a local world"
            )));
        }
        Ok(peer as usize)
    }
}

fn check_tag(tag: i32) -> Result<()> {
    if tag < 0 {
        return Err(Error::InvalidTag(tag));
    }
    Ok(())
}

fn check_len(len: usize, datatype: DatatypeTag, count: usize) -> Result<()> {
    let expected = count * datatype.size();
    if len != expected {
        return Err(Error::InvalidBuffer(format!(
            "{len} bytes for {count} {datatype:?} element(s), expected {expected}"
        )));
    }
    Ok(())
}

fn finalized() -> Error {
    Error::Internal("local transport already finalized".into())
}

impl Transport for LocalTransport {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn processor_name(&self) -> Result<String> {
        Ok(format!("local:{}", self.rank))
    }

    fn send_bytes(
        &self,
        payload: &[u8],
        datatype: DatatypeTag,
        count: usize,
        dest: i32,
        tag: i32,
    ) -> Result<()> {
        let index = self.check_peer(dest)?;
        check_tag(tag)?;
        check_len(payload.len(), datatype, count)?;
        let outbox = self.outboxes[index].as_ref().ok_or_else(finalized)?;

        trace!(rank = self.rank, dest, tag, count, "posting send");
        let (ack, matched) = bounded(1);
        outbox
            .send(Envelope {
                tag,
                datatype,
                count,
                payload: payload.to_vec(),
                ack,
            })
            .map_err(|_| Error::PeerDisconnected { peer: dest })?;
        matched
            .recv()
            .map_err(|_| Error::PeerDisconnected { peer: dest })
    }

    fn recv_bytes(
        &self,
        buf: &mut [u8],
        datatype: DatatypeTag,
        count: usize,
        source: i32,
        tag: i32,
    ) -> Result<Status> {
        let index = self.check_peer(source)?;
        check_tag(tag)?;
        check_len(buf.len(), datatype, count)?;
        let inbox = self.inboxes[index].as_ref().ok_or_else(finalized)?;

        trace!(rank = self.rank, source, tag, count, "posting receive");
        let mut pending = self.pending[index].lock();
        let envelope = match pending.take() {
            Some(envelope) => envelope,
            None => inbox
                .recv()
                .map_err(|_| Error::PeerDisconnected { peer: source })?,
        };

        let mismatch = if envelope.tag != tag {
            Some(Error::TagMismatch {
                expected: tag,
                actual: envelope.tag,
            })
        } else if envelope.datatype != datatype {
            Some(Error::DatatypeMismatch {
                expected: datatype,
                found: Some(envelope.datatype),
            })
        } else if envelope.count != count {
            Some(Error::CountMismatch {
                expected: count,
                actual: envelope.count as i64,
            })
        } else {
            None
        };
        if let Some(err) = mismatch {
            *pending = Some(envelope);
            return Err(err);
        }
        buf.copy_from_slice(&envelope.payload);
        if envelope.ack.send(()).is_err() {
            trace!(rank = self.rank, source, "sender gone before acknowledgement");
        }

        Ok(Status {
            source,
            tag: envelope.tag,
            count: envelope.count as i64,
        })
    }

    fn finalize(&mut self) -> Result<()> {
        // Dropping the endpoints and any pending acknowledgement wakes every
        // peer blocked on this rank
        self.outboxes.iter_mut().for_each(|slot| *slot = None);
        self.inboxes.iter_mut().for_each(|slot| *slot = None);
        self.pending.iter().for_each(|slot| *slot.lock() = None);
        Ok(())
    }
}
