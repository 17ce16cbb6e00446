//! Symmetric memory adapter
//!
//! Every rank allocates the same objects in symmetric memory: its send row
//! and its key array. Peers read them directly with `get`, so both the count
//! map and the keys flow toward the reader.

use super::world::Shared;
use super::{Exchange, Flow, Transport};
use crate::err::TransportError;
use std::sync::Arc;
use tracing::trace;

/// Symmetric memory endpoint for one rank
#[derive(Debug)]
pub(super) struct Symmetric {
    /// This rank
    rank: usize,
    /// Symmetric heap
    shared: Arc<Shared>,
}

impl Symmetric {
    /// Endpoint for `rank`.
    pub(super) fn new(rank: usize, shared: Arc<Shared>) -> Self {
        Self { rank, shared }
    }
}

impl Exchange for Symmetric {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size()
    }

    fn transport(&self) -> Transport {
        Transport::Symmetric
    }

    fn flow(&self) -> Flow {
        Flow::Pull
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.shared.sync.wait()
    }

    fn abort(&mut self) {
        self.shared.sync.abort();
    }

    fn all_gather(&mut self, value: usize) -> Result<Vec<usize>, TransportError> {
        self.shared.all_gather(self.rank, value)
    }

    fn expose_row(&mut self, sends: &[usize]) -> Result<(), TransportError> {
        self.shared.store_row(self.rank, sends);
        Ok(())
    }

    fn fetch_row(&mut self, peer: usize) -> Result<Vec<usize>, TransportError> {
        self.shared.load_row(peer)
    }

    fn open_window(&mut self, keys: Vec<u64>, destination: Vec<u64>) -> Result<(), TransportError> {
        self.shared.expose_keys(self.rank, keys);
        self.shared.open_destination(self.rank, destination);
        Ok(())
    }

    fn transfer_slice(
        &mut self,
        peer: usize,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), TransportError> {
        self.shared
            .copy_keys(peer, src_offset, self.rank, dst_offset, len)?;
        trace!(rank = self.rank, from = peer, offset = dst_offset, len, "get");
        Ok(())
    }

    fn close_window(&mut self) -> Result<Vec<u64>, TransportError> {
        self.shared.withdraw_keys(self.rank);
        self.shared.take_destination(self.rank)
    }
}
