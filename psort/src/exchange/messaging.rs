//! Two-sided messaging adapter
//!
//! Every ordered pair of ranks owns a FIFO channel. Row and key exchanges
//! are paired send/receive steps: in distance round `d` a rank sends to
//! `rank + d` and receives from `rank - d`, so every rank posts exactly one
//! send and one receive per round and nobody waits on a message that was
//! never sent. Sends never block; receives poll so an abort is noticed.

use super::world::Shared;
use super::{check_bounds, peer_above, peer_below, Exchange, Transport};
use crate::err::TransportError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// How long a receive blocks before rechecking for an abort
const ABORT_POLL: Duration = Duration::from_millis(5);

/// Wire message between two ranks
#[derive(Debug)]
enum Message {
    /// Contribution to a gather
    Value(usize),
    /// A rank's send counts
    Row(Vec<usize>),
    /// Keys to be placed at `offset` of the receiver's window
    Keys {
        /// Destination offset in the receiving window
        offset: usize,
        /// Payload
        keys: Vec<u64>,
    },
}

/// Messaging endpoint for one rank
#[derive(Debug)]
pub(super) struct Messaging {
    /// This rank
    rank: usize,
    /// World state; only the barrier is used
    shared: Arc<Shared>,
    /// Outgoing channels, indexed by receiver
    outbox: Vec<Sender<Message>>,
    /// Incoming channels, indexed by sender
    inbox: Vec<Receiver<Message>>,
    /// Send counts to hand out in row rounds
    row: Vec<usize>,
    /// Local keys, source of outgoing transfers
    keys: Option<Vec<u64>>,
    /// Receive buffer
    destination: Option<Vec<u64>>,
}

impl Messaging {
    /// Build the fully connected set of endpoints for `shared`, indexed by
    /// rank.
    pub(super) fn connect(shared: &Arc<Shared>) -> Vec<Self> {
        let size = shared.size();
        let mut outboxes: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Message>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for (from, outbox) in outboxes.iter_mut().enumerate() {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = unbounded();
                outbox.push(tx);
                inbox[from] = Some(rx);
            }
        }
        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| Self {
                rank,
                shared: shared.clone(),
                outbox,
                inbox: inbox.into_iter().flatten().collect(),
                row: Vec::new(),
                keys: None,
                destination: None,
            })
            .collect()
    }

    /// Queue `message` for `peer`.
    fn send(&self, peer: usize, message: Message) -> Result<(), TransportError> {
        self.outbox
            .get(peer)
            .ok_or(TransportError::NoSuchRank {
                rank: peer,
                size: self.outbox.len(),
            })?
            .send(message)
            .map_err(|_| self.hangup(peer))
    }

    /// Wait for the next message from `peer`.
    fn recv(&self, peer: usize) -> Result<Message, TransportError> {
        let inbox = self.inbox.get(peer).ok_or(TransportError::NoSuchRank {
            rank: peer,
            size: self.inbox.len(),
        })?;
        loop {
            match inbox.recv_timeout(ABORT_POLL) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.sync.is_aborted() {
                        return Err(TransportError::Aborted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(self.hangup(peer)),
            }
        }
    }

    /// Error for a closed channel to `peer`: an aborting peer drops its
    /// endpoint, which should read as the abort rather than a crash.
    fn hangup(&self, peer: usize) -> TransportError {
        if self.shared.sync.is_aborted() {
            TransportError::Aborted
        } else {
            TransportError::Disconnected { peer }
        }
    }

    /// Distance from this rank up to `peer` on the ring.
    fn distance_to(&self, peer: usize) -> usize {
        let size = self.size();
        (size + peer - self.rank) % size
    }
}

impl Exchange for Messaging {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbox.len()
    }

    fn transport(&self) -> Transport {
        Transport::Messaging
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.shared.sync.wait()
    }

    fn abort(&mut self) {
        self.shared.sync.abort();
    }

    fn all_gather(&mut self, value: usize) -> Result<Vec<usize>, TransportError> {
        let size = self.size();
        for d in 1..size {
            self.send(peer_above(self.rank, d, size), Message::Value(value))?;
        }
        let mut values = vec![0; size];
        values[self.rank] = value;
        for d in 1..size {
            let peer = peer_below(self.rank, d, size);
            match self.recv(peer)? {
                Message::Value(v) => values[peer] = v,
                _ => {
                    return Err(TransportError::UnexpectedMessage {
                        peer,
                        expected: "gather value",
                    })
                }
            }
        }
        Ok(values)
    }

    fn expose_row(&mut self, sends: &[usize]) -> Result<(), TransportError> {
        self.row.clear();
        self.row.extend_from_slice(sends);
        Ok(())
    }

    fn fetch_row(&mut self, peer: usize) -> Result<Vec<usize>, TransportError> {
        if peer == self.rank {
            return Ok(self.row.clone());
        }
        let distance = self.size() - self.distance_to(peer);
        let dest = peer_above(self.rank, distance, self.size());
        self.send(dest, Message::Row(self.row.clone()))?;
        match self.recv(peer)? {
            Message::Row(row) if row.len() == self.size() => Ok(row),
            _ => Err(TransportError::UnexpectedMessage {
                peer,
                expected: "send row",
            }),
        }
    }

    fn open_window(&mut self, keys: Vec<u64>, destination: Vec<u64>) -> Result<(), TransportError> {
        self.keys = Some(keys);
        self.destination = Some(destination);
        Ok(())
    }

    fn transfer_slice(
        &mut self,
        peer: usize,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), TransportError> {
        let keys = self.keys.as_ref().ok_or(TransportError::WindowClosed("key"))?;
        check_bounds("key", self.rank, src_offset, len, keys.len())?;
        let payload = &keys[src_offset..src_offset + len];

        if peer == self.rank {
            let destination = self
                .destination
                .as_mut()
                .ok_or(TransportError::WindowClosed("destination"))?;
            check_bounds("destination", peer, dst_offset, len, destination.len())?;
            destination[dst_offset..dst_offset + len].copy_from_slice(payload);
            return Ok(());
        }

        let message = Message::Keys {
            offset: dst_offset,
            keys: payload.to_vec(),
        };
        self.send(peer, message)?;

        let source = peer_below(self.rank, self.distance_to(peer), self.size());
        let (offset, incoming) = match self.recv(source)? {
            Message::Keys { offset, keys } => (offset, keys),
            _ => {
                return Err(TransportError::UnexpectedMessage {
                    peer: source,
                    expected: "keys",
                })
            }
        };
        trace!(
            rank = self.rank,
            to = peer,
            sent = len,
            from = source,
            received = incoming.len(),
            "sendrecv"
        );
        let destination = self
            .destination
            .as_mut()
            .ok_or(TransportError::WindowClosed("destination"))?;
        check_bounds("destination", self.rank, offset, incoming.len(), destination.len())?;
        destination[offset..offset + incoming.len()].copy_from_slice(&incoming);
        Ok(())
    }

    fn close_window(&mut self) -> Result<Vec<u64>, TransportError> {
        self.keys = None;
        self.destination
            .take()
            .ok_or(TransportError::WindowClosed("destination"))
    }
}
