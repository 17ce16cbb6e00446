//! Partitioned global address space adapter
//!
//! The count map is one shared `npes × npes` array distributed by column:
//! column `j`, the counts every rank sends to `j`, has affinity on rank `j`.
//! A rank writes its row with one collective scatter across the columns,
//! sums its own column locally after a barrier and reads remote columns only
//! where placement needs them. Keys are copied straight into the shared
//! segment that holds the receiver's window.

use super::world::Shared;
use super::{Exchange, MapLayout, Transport};
use crate::err::TransportError;
use std::sync::Arc;
use tracing::trace;

/// Partitioned endpoint for one rank
#[derive(Debug)]
pub(super) struct Partitioned {
    /// This rank, the thread's affinity
    rank: usize,
    /// Shared segment
    shared: Arc<Shared>,
}

impl Partitioned {
    /// Endpoint for `rank`.
    pub(super) fn new(rank: usize, shared: Arc<Shared>) -> Self {
        Self { rank, shared }
    }
}

impl Exchange for Partitioned {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size()
    }

    fn transport(&self) -> Transport {
        Transport::Partitioned
    }

    fn map_layout(&self) -> MapLayout {
        MapLayout::Columns
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
        self.shared.store_row_by_column(self.rank, sends)
    }

    fn fetch_row(&mut self, peer: usize) -> Result<Vec<usize>, TransportError> {
        let _ = peer;
        Err(TransportError::Unsupported {
            transport: self.transport().into(),
            operation: "row reads",
        })
    }

    fn fetch_column(&mut self, peer: usize) -> Result<Vec<usize>, TransportError> {
        self.shared.load_column(peer)
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
            .copy_keys(self.rank, src_offset, peer, dst_offset, len)?;
        trace!(rank = self.rank, to = peer, offset = dst_offset, len, "memput");
        Ok(())
    }

    fn close_window(&mut self) -> Result<Vec<u64>, TransportError> {
        self.shared.withdraw_keys(self.rank);
        self.shared.take_destination(self.rank)
    }
}
