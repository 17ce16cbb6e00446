//! Communication capability used by the distributed sort
//!
//! The sort is one protocol written against the [`Exchange`] trait. Each
//! communication model is a separate adapter:
//!
//! - [`Transport::Messaging`]: two-sided paired send/receive.
//! - [`Transport::OneSided`]: one-sided remote memory access, each access
//!   bracketed by fences, with data pushed by `put`.
//! - [`Transport::Symmetric`]: symmetric memory, rows and keys pulled by
//!   `get` from the peer's exposed memory.
//! - [`Transport::Partitioned`]: partitioned global address space, with the
//!   count map stored by column affinity and keys copied straight into the
//!   shared segment owned by the receiver.
//!
//! All four are hosted by an in-process [`World`], one thread per rank. The
//! placement of keys is identical whichever adapter carries them.

mod messaging;
mod one_sided;
mod partitioned;
mod symmetric;
mod world;

use crate::err::TransportError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub use world::World;

/// Selects an [`Exchange`] adapter
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum Transport {
    /// Two-sided messaging
    #[default]
    Messaging,
    /// One-sided remote memory access with fences
    OneSided,
    /// Symmetric get/put memory
    Symmetric,
    /// Partitioned global address space
    Partitioned,
}

/// How ranks build their knowledge of the count map
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum MapLayout {
    /// Every rank collects every row with one [`Exchange::fetch_row`] per
    /// distance round, ending up with the whole matrix.
    Rows,
    /// The matrix lives in shared memory with column `j` on rank `j`. Ranks
    /// read columns with [`Exchange::fetch_column`] and gather the column
    /// sums with [`Exchange::all_gather`].
    Columns,
}

/// Which side of a key transfer drives it
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum Flow {
    /// The sender writes into the receiver's window; in round `d` a rank
    /// transfers to `rank + d`.
    Push,
    /// The receiver reads from the sender's exposed keys; in round `d` a
    /// rank transfers from `rank - d`.
    Pull,
}

/// One rank's handle on the communication substrate
///
/// Every method that communicates is collective or pairwise: all ranks call
/// it in the same order, SPMD style. A failure on any rank is terminal for
/// the job, and the failing rank calls [`Exchange::abort`] so that its peers
/// fail too instead of waiting forever.
pub trait Exchange {
    /// Zero-based rank of this endpoint.
    fn rank(&self) -> usize;

    /// Number of ranks in the job.
    fn size(&self) -> usize;

    /// The adapter behind this endpoint.
    fn transport(&self) -> Transport;

    /// How the count map is shared.
    fn map_layout(&self) -> MapLayout {
        MapLayout::Rows
    }

    /// Which side drives key transfers.
    fn flow(&self) -> Flow {
        Flow::Push
    }

    /// Wait until every rank has reached this point.
    fn barrier(&mut self) -> Result<(), TransportError>;

    /// Give up on the job, releasing every peer blocked in or later entering
    /// a synchronization point with [`TransportError::Aborted`].
    fn abort(&mut self);

    /// Contribute `value` and receive the contribution of every rank,
    /// indexed by rank.
    fn all_gather(&mut self, value: usize) -> Result<Vec<usize>, TransportError>;

    /// Global maximum of one value per rank.
    fn reduce_max(&mut self, value: usize) -> Result<usize, TransportError> {
        Ok(self.all_gather(value)?.into_iter().max().unwrap_or(0))
    }

    /// Make this rank's send counts available to its peers.
    ///
    /// Peers may read them only after the next [`Exchange::barrier`].
    fn expose_row(&mut self, sends: &[usize]) -> Result<(), TransportError>;

    /// Obtain the send counts of `peer`.
    ///
    /// Called once per distance round with `peer = rank - distance`. Two-sided
    /// transports pair this with sending the local row to `rank + distance`.
    fn fetch_row(&mut self, peer: usize) -> Result<Vec<usize>, TransportError>;

    /// Read column `peer` of the count map, stored with affinity on `peer`.
    fn fetch_column(&mut self, peer: usize) -> Result<Vec<usize>, TransportError> {
        let _ = peer;
        Err(TransportError::Unsupported {
            transport: self.transport().into(),
            operation: "column reads",
        })
    }

    /// Expose the local keys as the source of transfers and install
    /// `destination` as the window receiving this rank's keys.
    ///
    /// Peers may access either only after the next [`Exchange::barrier`].
    fn open_window(&mut self, keys: Vec<u64>, destination: Vec<u64>) -> Result<(), TransportError>;

    /// Move `len` keys between this rank and `peer`.
    ///
    /// With [`Flow::Push`] the keys at `src_offset` of the local array land at
    /// `dst_offset` of `peer`'s window. With [`Flow::Pull`] the keys at
    /// `src_offset` of `peer`'s exposed array land at `dst_offset` of the
    /// local window. A transfer with `peer == rank` is a local copy.
    fn transfer_slice(
        &mut self,
        peer: usize,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), TransportError>;

    /// Withdraw the window opened by [`Exchange::open_window`], returning the
    /// destination buffer. The exposed local keys are released.
    ///
    /// Only valid after a barrier that follows every transfer.
    fn close_window(&mut self) -> Result<Vec<u64>, TransportError>;
}

/// Peer at `distance` above `rank`, wrapping around.
#[inline(always)]
pub(crate) fn peer_above(rank: usize, distance: usize, size: usize) -> usize {
    (rank + distance) % size
}

/// Peer at `distance` below `rank`, wrapping around.
#[inline(always)]
pub(crate) fn peer_below(rank: usize, distance: usize, size: usize) -> usize {
    (size + rank - distance % size) % size
}

/// Check that `offset..offset + len` lies inside a window of `size`.
pub(crate) fn check_bounds(
    window: &'static str,
    peer: usize,
    offset: usize,
    len: usize,
    size: usize,
) -> Result<(), TransportError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransportError::OutOfBounds {
            window,
            peer,
            offset,
            len,
            size,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ring_neighbours() {
        assert_eq!(peer_above(3, 1, 4), 0);
        assert_eq!(peer_below(0, 1, 4), 3);
        assert_eq!(peer_below(2, 3, 5), 4);
        assert_eq!(peer_above(2, 3, 5), 0);
        for size in 1..8 {
            for rank in 0..size {
                for d in 0..size {
                    assert_eq!(peer_below(peer_above(rank, d, size), d, size), rank);
                }
            }
        }
    }

    #[test]
    fn transport_names() {
        assert_eq!(Transport::from_str("one-sided"), Ok(Transport::OneSided));
        assert_eq!(Transport::Partitioned.to_string(), "partitioned");
        let name: &'static str = Transport::Symmetric.into();
        assert_eq!(name, "symmetric");
    }

    #[test]
    fn bounds() {
        assert!(check_bounds("keys", 0, 2, 3, 5).is_ok());
        assert!(check_bounds("keys", 0, 5, 0, 5).is_ok());
        assert!(matches!(
            check_bounds("keys", 1, 4, 2, 5),
            Err(TransportError::OutOfBounds { peer: 1, .. })
        ));
        assert!(check_bounds("keys", 0, usize::MAX, 2, 5).is_err());
    }
}
