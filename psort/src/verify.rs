//! Checking a finished sort
//!
//! Each rank condenses its input into a [`Fingerprint`] and its output into
//! a [`RankSummary`]; neither holds the keys themselves. [`verify`] then
//! checks the job as a whole:
//!
//! - no key was lost, duplicated or altered (count and XOR checksum),
//! - every rank's output is ascending,
//! - the last key of each rank is at most the first key of the next
//!   non-empty rank,
//! - every key sits on the rank whose bucket range holds it.

use crate::err::VerifyError;
use crate::partition::{partition, right_shift, shifted_bucket};

/// Order-independent digest of a key multiset
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Fingerprint {
    /// Number of keys
    count: usize,
    /// XOR of all keys
    checksum: u64,
}

impl Fingerprint {
    /// Digest of `keys`.
    pub fn of(keys: &[u64]) -> Self {
        Self {
            count: keys.len(),
            checksum: keys.iter().fold(0, |acc, k| acc ^ k),
        }
    }

    /// Digest of the union of two multisets.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            checksum: self.checksum ^ other.checksum,
        }
    }

    /// Number of keys digested.
    pub fn count(&self) -> usize {
        self.count
    }

    /// XOR of the keys digested.
    pub fn checksum(&self) -> u64 {
        self.checksum
    }
}

impl FromIterator<Fingerprint> for Fingerprint {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::merge)
    }
}

/// What verification needs to know about one rank's sorted output
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RankSummary {
    /// Rank the output belongs to
    rank: usize,
    /// Digest of the output keys
    fingerprint: Fingerprint,
    /// Smallest and largest key, if any
    bounds: Option<(u64, u64)>,
    /// First index where the output descends
    descent: Option<usize>,
    /// Keys outside the rank's bucket range
    misplaced: usize,
}

impl RankSummary {
    /// Summarize the output `keys` of `rank` in a job of `npes` ranks
    /// sorting keys tagged with `bbits` bits.
    pub fn new(rank: usize, npes: usize, bbits: u32, keys: &[u64]) -> Self {
        let misplaced = if rank < npes {
            let range = partition(npes)[rank];
            let rshft = right_shift(npes);
            keys.iter()
                .filter(|&&k| !range.contains(shifted_bucket(k, bbits, rshft)))
                .count()
        } else {
            keys.len()
        };
        Self {
            rank,
            fingerprint: Fingerprint::of(keys),
            bounds: keys.first().zip(keys.last()).map(|(&lo, &hi)| (lo, hi)),
            descent: keys.windows(2).position(|w| w[0] > w[1]).map(|i| i + 1),
            misplaced,
        }
    }

    /// Rank the summary describes.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Digest of the rank's output.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Check a whole job: `input` digests every rank's input keys, `summaries`
/// describe every rank's output in rank order.
pub fn verify(input: Fingerprint, summaries: &[RankSummary]) -> Result<(), VerifyError> {
    let output: Fingerprint = summaries.iter().map(RankSummary::fingerprint).collect();
    if output.count != input.count {
        return Err(VerifyError::Count {
            expected: input.count,
            actual: output.count,
        });
    }
    if output.checksum != input.checksum {
        return Err(VerifyError::Checksum {
            expected: input.checksum,
            actual: output.checksum,
        });
    }

    for summary in summaries {
        if let Some(index) = summary.descent {
            return Err(VerifyError::LocalOrder {
                rank: summary.rank,
                index,
            });
        }
        if summary.misplaced > 0 {
            return Err(VerifyError::Misplaced {
                rank: summary.rank,
                count: summary.misplaced,
            });
        }
    }

    let mut previous: Option<(usize, u64)> = None;
    for summary in summaries {
        let Some((first, last)) = summary.bounds else {
            continue;
        };
        if let Some((rank, prev_last)) = previous {
            if prev_last > first {
                return Err(VerifyError::Boundary {
                    rank,
                    next: summary.rank,
                });
            }
        }
        previous = Some((summary.rank, last));
    }
    Ok(())
}
