//! In-process world hosting one endpoint per rank
//!
//! The world owns everything ranks share: a barrier that can be aborted,
//! scalar slots for small collectives, exposed send rows, the
//! column-affinity count matrix, exposed key arrays and destination windows.
//! Each region has exactly one writer per protocol phase, and the barrier
//! orders phases, so the locks here only ever see short uncontended
//! critical sections.

use super::messaging::Messaging;
use super::one_sided::OneSided;
use super::partitioned::Partitioned;
use super::symmetric::Symmetric;
use super::{check_bounds, Exchange, Transport};
use crate::err::{Error, TransportError};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::thread;

/// Barrier state protected by [`SyncPoint::state`]
#[derive(Debug, Default)]
struct SyncState {
    /// Ranks waiting in the current generation
    arrived: usize,
    /// Completed barrier count
    generation: u64,
    /// Set once any rank aborts; never cleared
    aborted: bool,
}

/// Reusable barrier which can be broken by an abort
#[derive(Debug)]
pub(super) struct SyncPoint {
    /// Number of ranks that must arrive
    parties: usize,
    /// Arrival bookkeeping
    state: Mutex<SyncState>,
    /// Wakes waiters when a generation completes or the job aborts
    cvar: Condvar,
}

impl SyncPoint {
    /// Barrier for `parties` ranks.
    fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(SyncState::default()),
            cvar: Condvar::new(),
        }
    }

    /// Block until all parties arrive, or fail if the job is aborted.
    pub(super) fn wait(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(TransportError::Aborted);
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return Ok(());
        }
        while state.generation == generation && !state.aborted {
            self.cvar.wait(&mut state);
        }
        if state.generation != generation {
            Ok(())
        } else {
            Err(TransportError::Aborted)
        }
    }

    /// Break the barrier for good.
    pub(super) fn abort(&self) {
        self.state.lock().aborted = true;
        self.cvar.notify_all();
    }

    /// Has any rank aborted?
    pub(super) fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

/// Memory and synchronization shared by every endpoint of a [`World`]
#[derive(Debug)]
pub(super) struct Shared {
    /// Number of ranks
    size: usize,
    /// Job-wide barrier
    pub(super) sync: SyncPoint,
    /// One scalar per rank, for gathers and reductions
    slots: Vec<Mutex<usize>>,
    /// Exposed send rows, indexed by owning rank
    rows: Vec<RwLock<Vec<usize>>>,
    /// Count matrix by column affinity: `columns[j][i]` is what rank `i`
    /// sends to rank `j`
    columns: Vec<RwLock<Vec<usize>>>,
    /// Exposed local key arrays, readable by remote `get`
    keys: Vec<RwLock<Option<Vec<u64>>>>,
    /// Destination windows, writable by remote `put`
    windows: Vec<Mutex<Option<Vec<u64>>>>,
}

impl Shared {
    /// Shared state for `size` ranks, with every region empty.
    fn new(size: usize) -> Self {
        Self {
            size,
            sync: SyncPoint::new(size),
            slots: (0..size).map(|_| Mutex::new(0)).collect(),
            rows: (0..size).map(|_| RwLock::new(Vec::new())).collect(),
            columns: (0..size).map(|_| RwLock::new(vec![0; size])).collect(),
            keys: (0..size).map(|_| RwLock::new(None)).collect(),
            windows: (0..size).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Number of ranks.
    pub(super) fn size(&self) -> usize {
        self.size
    }

    /// Fail unless `rank` is inside the world.
    fn check_rank(&self, rank: usize) -> Result<(), TransportError> {
        if rank < self.size {
            Ok(())
        } else {
            Err(TransportError::NoSuchRank {
                rank,
                size: self.size,
            })
        }
    }

    /// Collective: publish one scalar per rank and read them all.
    ///
    /// The trailing barrier keeps a fast rank from overwriting its slot for
    /// the next gather while a slow one is still reading.
    pub(super) fn all_gather(&self, rank: usize, value: usize) -> Result<Vec<usize>, TransportError> {
        *self.slots[rank].lock() = value;
        self.sync.wait()?;
        let values = self.slots.iter().map(|slot| *slot.lock()).collect();
        self.sync.wait()?;
        Ok(values)
    }

    /// Replace the exposed send row of `rank`.
    pub(super) fn store_row(&self, rank: usize, row: &[usize]) {
        let mut exposed = self.rows[rank].write();
        exposed.clear();
        exposed.extend_from_slice(row);
    }

    /// One-sided read of the send row exposed by `peer`.
    pub(super) fn load_row(&self, peer: usize) -> Result<Vec<usize>, TransportError> {
        self.check_rank(peer)?;
        let row = self.rows[peer].read();
        if row.len() != self.size {
            return Err(TransportError::WindowClosed("send row"));
        }
        Ok(row.clone())
    }

    /// Scatter row `rank` of the count matrix into the columns, one remote
    /// write per column owner.
    pub(super) fn store_row_by_column(&self, rank: usize, row: &[usize]) -> Result<(), TransportError> {
        if row.len() != self.size {
            return Err(TransportError::OutOfBounds {
                window: "count map",
                peer: rank,
                offset: 0,
                len: row.len(),
                size: self.size,
            });
        }
        for (column, &count) in self.columns.iter().zip(row) {
            column.write()[rank] = count;
        }
        Ok(())
    }

    /// Read the column of the count matrix with affinity on `peer`.
    pub(super) fn load_column(&self, peer: usize) -> Result<Vec<usize>, TransportError> {
        self.check_rank(peer)?;
        Ok(self.columns[peer].read().clone())
    }

    /// Expose `keys` as the remotely readable array of `rank`.
    pub(super) fn expose_keys(&self, rank: usize, keys: Vec<u64>) {
        *self.keys[rank].write() = Some(keys);
    }

    /// Withdraw the keys exposed by `rank`.
    pub(super) fn withdraw_keys(&self, rank: usize) -> Option<Vec<u64>> {
        self.keys[rank].write().take()
    }

    /// Install `buffer` as the destination window of `rank`.
    pub(super) fn open_destination(&self, rank: usize, buffer: Vec<u64>) {
        *self.windows[rank].lock() = Some(buffer);
    }

    /// Withdraw the destination window of `rank`.
    pub(super) fn take_destination(&self, rank: usize) -> Result<Vec<u64>, TransportError> {
        self.windows[rank]
            .lock()
            .take()
            .ok_or(TransportError::WindowClosed("destination"))
    }

    /// Copy `src` into `peer`'s destination window at `offset`.
    pub(super) fn put(&self, peer: usize, offset: usize, src: &[u64]) -> Result<(), TransportError> {
        self.check_rank(peer)?;
        let mut window = self.windows[peer].lock();
        let buffer = window
            .as_mut()
            .ok_or(TransportError::WindowClosed("destination"))?;
        check_bounds("destination", peer, offset, src.len(), buffer.len())?;
        buffer[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Copy `len` keys exposed by rank `from`, starting at `src_offset`,
    /// into the destination window of rank `to` at `dst_offset`.
    pub(super) fn copy_keys(
        &self,
        from: usize,
        src_offset: usize,
        to: usize,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), TransportError> {
        self.check_rank(from)?;
        let exposed = self.keys[from].read();
        let keys = exposed.as_ref().ok_or(TransportError::WindowClosed("key"))?;
        check_bounds("key", from, src_offset, len, keys.len())?;
        self.put(to, dst_offset, &keys[src_offset..src_offset + len])
    }
}

/// A set of ranks connected by one [`Transport`]
///
/// ```
/// use psort::{Exchange, Transport, World};
///
/// let world = World::new(3, Transport::Symmetric).unwrap();
/// let gathered = world.run(|mut ep| {
///     let rank = ep.rank();
///     ep.all_gather(rank * 10).unwrap()
/// });
/// assert_eq!(gathered, vec![vec![0, 10, 20]; 3]);
/// ```
#[derive(Debug, Clone)]
pub struct World {
    /// Adapter used by every endpoint
    transport: Transport,
    /// State visible to every endpoint
    shared: Arc<Shared>,
}

impl World {
    /// Create a world of `size` ranks.
    ///
    /// Fails with [`Error::Argument`] for an empty world.
    pub fn new(size: usize, transport: Transport) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::Argument("process count must be at least 1".into()));
        }
        Ok(Self {
            transport,
            shared: Arc::new(Shared::new(size)),
        })
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.shared.size()
    }

    /// Adapter used by this world's endpoints.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Build one endpoint per rank, indexed by rank.
    ///
    /// Each endpoint must be driven by its own thread; the endpoints of one
    /// world block on each other in every collective call.
    pub fn endpoints(&self) -> Vec<Box<dyn Exchange + Send>> {
        let shared = &self.shared;
        let ranks = 0..self.size();
        match self.transport {
            Transport::Messaging => Messaging::connect(shared)
                .into_iter()
                .map(|ep| Box::new(ep) as Box<dyn Exchange + Send>)
                .collect(),
            Transport::OneSided => ranks
                .map(|rank| Box::new(OneSided::new(rank, shared.clone())) as Box<dyn Exchange + Send>)
                .collect(),
            Transport::Symmetric => ranks
                .map(|rank| Box::new(Symmetric::new(rank, shared.clone())) as Box<dyn Exchange + Send>)
                .collect(),
            Transport::Partitioned => ranks
                .map(|rank| {
                    Box::new(Partitioned::new(rank, shared.clone())) as Box<dyn Exchange + Send>
                })
                .collect(),
        }
    }

    /// Run `f` once per rank on scoped threads and collect the results in
    /// rank order.
    ///
    /// Every rank gets a thread of its own, since no rank passes the first
    /// barrier before all of them have arrived. A panic on any rank thread
    /// is propagated once all threads finish.
    pub fn run<F, T>(&self, f: F) -> Vec<T>
    where
        F: Fn(Box<dyn Exchange + Send>) -> T + Sync,
        T: Send,
    {
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .endpoints()
                .into_iter()
                .enumerate()
                .map(|(rank, ep)| {
                    thread::Builder::new()
                        .name(format!("psort-rank-{rank}"))
                        .spawn_scoped(scope, move || f(ep))
                        .unwrap_or_else(|e| {
                            // Release the ranks already waiting on this one
                            self.shared.sync.abort();
                            panic!("failed to spawn rank {rank}: {e}")
                        })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(value) => value,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_world_rejected() {
        assert!(matches!(
            World::new(0, Transport::Messaging),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn barrier_orders_phases() {
        let shared = Shared::new(4);
        let counter = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for round in 1..=10 {
                        counter.fetch_add(1, Ordering::SeqCst);
                        shared.sync.wait().unwrap();
                        assert!(counter.load(Ordering::SeqCst) >= round * 4);
                        shared.sync.wait().unwrap();
                    }
                });
            }
        });
    }

    #[test]
    fn abort_releases_waiters() {
        let shared = Shared::new(3);
        thread::scope(|scope| {
            let waiters: Vec<_> = (0..2).map(|_| scope.spawn(|| shared.sync.wait())).collect();
            shared.sync.abort();
            for waiter in waiters {
                assert_eq!(waiter.join().unwrap(), Err(TransportError::Aborted));
            }
        });
        assert_eq!(shared.sync.wait(), Err(TransportError::Aborted));
        assert!(shared.sync.is_aborted());
    }

    #[test]
    fn window_access_is_checked() {
        let shared = Shared::new(2);
        assert_eq!(
            shared.put(1, 0, &[1]),
            Err(TransportError::WindowClosed("destination"))
        );
        shared.open_destination(1, vec![0; 2]);
        assert!(shared.put(1, 1, &[7]).is_ok());
        assert!(matches!(
            shared.put(1, 1, &[7, 8]),
            Err(TransportError::OutOfBounds { .. })
        ));
        assert!(matches!(
            shared.put(2, 0, &[]),
            Err(TransportError::NoSuchRank { rank: 2, size: 2 })
        ));
        assert_eq!(shared.take_destination(1), Ok(vec![0, 7]));
    }

    #[test]
    fn column_affinity_store() {
        let shared = Shared::new(3);
        shared.store_row_by_column(0, &[1, 2, 3]).unwrap();
        shared.store_row_by_column(2, &[7, 8, 9]).unwrap();
        assert_eq!(shared.load_column(1).unwrap(), vec![2, 0, 8]);
        assert!(shared.store_row_by_column(1, &[1, 2]).is_err());
        assert!(shared.store_row_by_column(1, &[1, 2, 3, 4]).is_err());
    }
}
