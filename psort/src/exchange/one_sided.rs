//! One-sided remote memory access adapter
//!
//! Rows and keys live in windows inside the shared world. Accesses happen in
//! epochs delimited by fences: a window exposed or opened by a rank may only
//! be touched once a fence has closed the exposure epoch, which here is the
//! next [`Exchange::barrier`]. Keys are pushed with `put`.

use super::world::Shared;
use super::{Exchange, Transport};
use crate::err::TransportError;
use std::sync::Arc;
use tracing::trace;

/// One-sided endpoint for one rank
#[derive(Debug)]
pub(super) struct OneSided {
    /// This rank
    rank: usize,
    /// Windows and fence
    shared: Arc<Shared>,
    /// Has a fence completed since the last window change?
    fenced: bool,
}

impl OneSided {
    /// Endpoint for `rank`.
    pub(super) fn new(rank: usize, shared: Arc<Shared>) -> Self {
        Self {
            rank,
            shared,
            fenced: false,
        }
    }

    /// Fail unless an access epoch is open.
    fn require_epoch(&self, window: &'static str) -> Result<(), TransportError> {
        if self.fenced {
            Ok(())
        } else {
            Err(TransportError::WindowClosed(window))
        }
    }
}

impl Exchange for OneSided {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size()
    }

    fn transport(&self) -> Transport {
        Transport::OneSided
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.shared.sync.wait()?;
        self.fenced = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.shared.sync.abort();
    }

    fn all_gather(&mut self, value: usize) -> Result<Vec<usize>, TransportError> {
        self.shared.all_gather(self.rank, value)
    }

    fn expose_row(&mut self, sends: &[usize]) -> Result<(), TransportError> {
        self.fenced = false;
        self.shared.store_row(self.rank, sends);
        Ok(())
    }

    fn fetch_row(&mut self, peer: usize) -> Result<Vec<usize>, TransportError> {
        self.require_epoch("send row")?;
        self.shared.load_row(peer)
    }

    fn open_window(&mut self, keys: Vec<u64>, destination: Vec<u64>) -> Result<(), TransportError> {
        self.fenced = false;
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
        self.require_epoch("destination")?;
        self.shared
            .copy_keys(self.rank, src_offset, peer, dst_offset, len)?;
        trace!(rank = self.rank, to = peer, offset = dst_offset, len, "put");
        Ok(())
    }

    fn close_window(&mut self) -> Result<Vec<u64>, TransportError> {
        self.require_epoch("destination")?;
        self.shared.withdraw_keys(self.rank);
        self.shared.take_destination(self.rank)
    }
}
