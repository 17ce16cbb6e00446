//! Sharing per-destination send counts between ranks
//!
//! Conceptually the job shares an `npes × npes` matrix whose row `i` holds
//! the send counts of rank `i`. With [`MapLayout::Rows`] every rank collects
//! the whole matrix, one row per distance round. With [`MapLayout::Columns`]
//! the matrix stays distributed by column and a rank only reads the columns
//! it writes into.
//!
//! The placement rule is the same either way: sender `s` writes its run for
//! receiver `d` at `Σ_{i<s} map[i][d]` of `d`'s window, so lower ranked
//! senders come first, and reads it from `Σ_{i<d} map[s][i]` of its own
//! sorted array.

use crate::err::{try_zeroed, Error, TransportError};
use crate::exchange::{peer_below, Exchange, MapLayout};
use tracing::debug;

/// What this rank knows about the count matrix
#[derive(Debug)]
enum Known {
    /// Whole matrix, row major
    Matrix(Vec<usize>),
    /// Only this rank's own column; others are read on demand
    Column(Vec<usize>),
}

/// Where one run of keys comes from and goes to
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Placement {
    /// Offset in the sender's sorted array
    pub(crate) src_offset: usize,
    /// Offset in the receiver's window
    pub(crate) dst_offset: usize,
    /// Number of keys
    pub(crate) len: usize,
}

/// One rank's view of the count map after the map exchange
#[derive(Debug)]
pub(crate) struct ExchangeMap {
    /// This rank
    rank: usize,
    /// Number of ranks
    size: usize,
    /// This rank's send counts
    sends: Vec<usize>,
    /// Column sums: post-exchange key count of every rank
    recvs: Vec<usize>,
    /// Matrix knowledge
    known: Known,
}

impl ExchangeMap {
    /// Collective: share `sends` with every rank and learn the receive
    /// counts.
    pub(crate) fn build<E: Exchange + ?Sized>(ex: &mut E, sends: Vec<usize>) -> Result<Self, Error> {
        let rank = ex.rank();
        let size = ex.size();
        debug_assert_eq!(sends.len(), size);

        ex.expose_row(&sends)?;
        ex.barrier()?;

        let (known, recvs) = match ex.map_layout() {
            MapLayout::Rows => {
                // An overflowing cell count is refused by the allocator too
                let cells = size.saturating_mul(size);
                let mut matrix: Vec<usize> = try_zeroed("exchange map", cells)?;
                matrix[rank * size..(rank + 1) * size].copy_from_slice(&sends);
                for distance in 1..size {
                    let source = peer_below(rank, distance, size);
                    let row = ex.fetch_row(source)?;
                    if row.len() != size {
                        return Err(TransportError::UnexpectedMessage {
                            peer: source,
                            expected: "send row",
                        }
                        .into());
                    }
                    matrix[source * size..(source + 1) * size].copy_from_slice(&row);
                    ex.barrier()?;
                }
                let mut recvs: Vec<usize> = try_zeroed("receive counts", size)?;
                for row in matrix.chunks_exact(size) {
                    for (recv, count) in recvs.iter_mut().zip(row) {
                        *recv += count;
                    }
                }
                (Known::Matrix(matrix), recvs)
            }
            MapLayout::Columns => {
                let column = ex.fetch_column(rank)?;
                let recvs = ex.all_gather(column.iter().sum())?;
                (Known::Column(column), recvs)
            }
        };

        debug!(rank, ?sends, ?recvs, "exchange map built");
        Ok(Self {
            rank,
            size,
            sends,
            recvs,
            known,
        })
    }

    /// Keys this rank receives.
    pub(crate) fn own_recv(&self) -> usize {
        self.recvs[self.rank]
    }

    /// Release the count buffers, keeping the send and receive counts.
    pub(crate) fn into_counts(self) -> (Vec<usize>, Vec<usize>) {
        (self.sends, self.recvs)
    }

    /// Placement of the run `sender` transfers to `receiver`.
    ///
    /// With a column layout only runs sent by this rank can be placed, at
    /// the cost of one column read when `receiver` is remote.
    pub(crate) fn placement<E: Exchange + ?Sized>(
        &self,
        ex: &mut E,
        sender: usize,
        receiver: usize,
    ) -> Result<Placement, Error> {
        match &self.known {
            Known::Matrix(matrix) => {
                let row = &matrix[sender * self.size..(sender + 1) * self.size];
                Ok(Placement {
                    src_offset: row[..receiver].iter().sum(),
                    dst_offset: (0..sender).map(|i| matrix[i * self.size + receiver]).sum(),
                    len: row[receiver],
                })
            }
            Known::Column(own) => {
                if sender != self.rank {
                    return Err(TransportError::Unsupported {
                        transport: ex.transport().into(),
                        operation: "placing runs sent by other ranks",
                    }
                    .into());
                }
                let dst_offset = if receiver == self.rank {
                    own[..sender].iter().sum()
                } else {
                    let column = ex.fetch_column(receiver)?;
                    column[..sender].iter().sum()
                };
                Ok(Placement {
                    src_offset: self.sends[..receiver].iter().sum(),
                    dst_offset,
                    len: self.sends[receiver],
                })
            }
        }
    }
}
