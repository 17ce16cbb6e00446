//! Error types for the `psort` crate

use std::collections::TryReserveError;

/// Errors that end a distributed sort
///
/// Every variant is terminal for the whole job. Partial completion of the
/// exchange protocol leaves no valid global state, so nothing here is ever
/// retried.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The call was rejected before any communication took place.
    ///
    /// All ranks derive their arguments identically, so all ranks fail with
    /// the same error and no peer is left waiting.
    #[error("invalid sort arguments: {0}")]
    Argument(String),

    /// A per-call buffer could not be allocated.
    #[error("failed to allocate {what} ({len} elements)")]
    Allocation {
        /// Which buffer was being allocated
        what: &'static str,
        /// Requested number of elements
        len: usize,
        /// Why the allocator refused
        #[source]
        source: TryReserveError,
    },

    /// The local array was not ordered by shifted bucket value, so the
    /// bucketizing scan stopped before reaching the end of it.
    ///
    /// Mixed bucket tags are caught earlier as [`Error::MixedTags`], so
    /// this means the local sort itself left the keys out of order.
    #[error("bucketizer left {unassigned} of {total} keys unassigned; keys are not bucket-ordered")]
    Unordered {
        /// Keys that fell outside every remaining bucket range
        unassigned: usize,
        /// Local key count
        total: usize,
    },

    /// The high `bbits` bits of the keys are not uniform across the job,
    /// which breaks the upstream bucket tagging contract.
    ///
    /// Raised by every sort algorithm. A rank holding mixed tags fails on
    /// its own and aborts its peers; ranks that each hold one tag but
    /// disagree with each other all fail together.
    #[error("keys carry bucket tags from {low:#x} to {high:#x}; all keys must share one tag")]
    MixedTags {
        /// Smallest tag seen
        low: u64,
        /// Largest tag seen
        high: u64,
    },

    /// A communication primitive failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Failures reported by an [`Exchange`](crate::Exchange) implementation
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Some rank aborted the job; this rank can't make further progress.
    #[error("job aborted by another rank")]
    Aborted,

    /// A peer endpoint hung up before the protocol finished.
    #[error("peer {peer} disconnected")]
    Disconnected {
        /// Rank of the vanished peer
        peer: usize,
    },

    /// A two-sided receive got a different message than the protocol
    /// expected at this point.
    #[error("unexpected message from peer {peer}: expected {expected}")]
    UnexpectedMessage {
        /// Rank that sent the message
        peer: usize,
        /// Kind of message the protocol was waiting for
        expected: &'static str,
    },

    /// A transfer would touch memory outside an exposed window.
    #[error("access to {window} window of rank {peer} out of bounds: {offset}+{len} > {size}")]
    OutOfBounds {
        /// Window being accessed
        window: &'static str,
        /// Rank owning the window
        peer: usize,
        /// First element of the access
        offset: usize,
        /// Number of elements accessed
        len: usize,
        /// Size of the window
        size: usize,
    },

    /// The operation requires a window that hasn't been opened yet.
    #[error("{0} window is not open")]
    WindowClosed(&'static str),

    /// The rank index is outside the world.
    #[error("rank {rank} is outside a world of {size}")]
    NoSuchRank {
        /// Offending rank
        rank: usize,
        /// Number of ranks in the world
        size: usize,
    },

    /// This transport doesn't provide the requested primitive.
    #[error("{transport} transport does not support {operation}")]
    Unsupported {
        /// Transport name
        transport: &'static str,
        /// Primitive that was requested
        operation: &'static str,
    },
}

/// Allocate a zeroed vector of `len` elements, reporting failure instead of
/// aborting the process.
pub(crate) fn try_zeroed<T: Copy + Default>(what: &'static str, len: usize) -> Result<Vec<T>, Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|source| Error::Allocation { what, len, source })?;
    v.resize(len, T::default());
    Ok(v)
}

/// A sorted key set that fails verification
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// Keys were lost or duplicated.
    #[error("expected {expected} keys in total, found {actual}")]
    Count {
        /// Total input key count
        expected: usize,
        /// Total output key count
        actual: usize,
    },

    /// The XOR of all keys changed, so some key was altered.
    #[error("checksum mismatch: expected {expected:#018x}, found {actual:#018x}")]
    Checksum {
        /// XOR of every input key
        expected: u64,
        /// XOR of every output key
        actual: u64,
    },

    /// A rank's output is not ascending.
    #[error("rank {rank} is out of order at index {index}")]
    LocalOrder {
        /// Offending rank
        rank: usize,
        /// First index whose key is smaller than its predecessor
        index: usize,
    },

    /// A rank's last key is greater than the first key of the next
    /// non-empty rank.
    #[error("last key of rank {rank} exceeds first key of rank {next}")]
    Boundary {
        /// Lower rank
        rank: usize,
        /// Next non-empty rank
        next: usize,
    },

    /// A rank holds keys outside its bucket range.
    #[error("rank {rank} holds {count} keys outside its bucket range")]
    Misplaced {
        /// Offending rank
        rank: usize,
        /// Number of misplaced keys
        count: usize,
    },
}
