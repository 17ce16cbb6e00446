//! Static partition of shifted bucket values across ranks
//!
//! Every rank computes the same table from nothing but the process count, so
//! no communication is needed to agree on it. The split is an equal division
//! of the value space and ignores the actual key distribution: skewed input
//! produces skewed receive counts.

use std::ops::RangeInclusive;

/// Closed interval of shifted bucket values owned by one rank
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub struct BucketRange {
    /// Lowest value in the range
    pub low: u64,
    /// Highest value in the range
    pub high: u64,
}

impl BucketRange {
    /// Does this range contain the shifted bucket value `rsv`?
    #[inline(always)]
    pub fn contains(&self, rsv: u64) -> bool {
        rsv >= self.low && rsv <= self.high
    }

    /// Number of values in the range.
    pub fn width(&self) -> u64 {
        self.high - self.low + 1
    }

    /// View as a standard inclusive range.
    pub fn as_range(&self) -> RangeInclusive<u64> {
        self.low..=self.high
    }
}

/// Number of key bits that select a rank, `ceil(log2(npes))`.
///
/// This is the 1-based position of the highest set bit of `npes - 1`, and
/// zero for a single process.
#[inline(always)]
pub fn pe_bits(npes: usize) -> u32 {
    usize::BITS - npes.saturating_sub(1).leading_zeros()
}

/// Right shift that isolates the rank-selecting bits, `64 - pe_bits`.
#[inline(always)]
pub(crate) fn right_shift(npes: usize) -> u32 {
    u64::BITS - pe_bits(npes)
}

/// Shifted bucket value of a key: drop the `bbits` tag bits, then keep the
/// next `64 - rshft` bits.
///
/// Shifts of 64 or more bits produce zero, so with one process every key
/// maps to value 0.
#[inline(always)]
pub fn shifted_bucket(key: u64, bbits: u32, rshft: u32) -> u64 {
    key.checked_shl(bbits)
        .unwrap_or(0)
        .checked_shr(rshft)
        .unwrap_or(0)
}

/// Compute the bucket range of every rank.
///
/// The value space `[0, r)` with `r = 2^pe_bits` is divided into `npes`
/// contiguous parts in rank order. The first `r mod npes` ranks receive one
/// extra value.
///
/// # Panics
///
/// Panics if `npes` is zero: a job has at least one process.
pub fn partition(npes: usize) -> Vec<BucketRange> {
    assert!(npes >= 1, "a job has at least one process");
    let r: u64 = 1 << pe_bits(npes);
    let npes_u64 = npes as u64;
    let base = r / npes_u64;
    let mut rem = r % npes_u64;

    let mut ranges = Vec::with_capacity(npes);
    let mut start: u64 = 0;
    for _ in 0..npes {
        let width = if rem > 0 {
            rem -= 1;
            base + 1
        } else {
            base
        };
        // r >= npes, so every rank owns at least one value
        ranges.push(BucketRange {
            low: start,
            high: start + width - 1,
        });
        start += width;
    }
    ranges
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pe_bits_matches_ceil_log2() {
        assert_eq!(pe_bits(1), 0);
        assert_eq!(pe_bits(2), 1);
        assert_eq!(pe_bits(3), 2);
        assert_eq!(pe_bits(4), 2);
        assert_eq!(pe_bits(5), 3);
        assert_eq!(pe_bits(8), 3);
        assert_eq!(pe_bits(9), 4);
        assert_eq!(pe_bits(1000), 10);
        assert_eq!(pe_bits(1024), 10);
    }

    #[test]
    fn single_process() {
        assert_eq!(partition(1), vec![BucketRange { low: 0, high: 0 }]);
        assert_eq!(right_shift(1), 64);
        assert_eq!(shifted_bucket(u64::MAX, 0, 64), 0);
    }

    #[test]
    #[should_panic(expected = "at least one process")]
    fn empty_job_has_no_partition() {
        let _ = partition(0);
    }

    #[test]
    fn power_of_two_is_one_value_each() {
        for npes in [2usize, 4, 8, 16, 64] {
            let ranges = partition(npes);
            for (rank, range) in ranges.iter().enumerate() {
                assert_eq!(range.low, rank as u64);
                assert_eq!(range.high, rank as u64);
            }
        }
    }

    #[test]
    fn three_ranks() {
        // r = 4, first rank takes the remainder
        assert_eq!(
            partition(3),
            vec![
                BucketRange { low: 0, high: 1 },
                BucketRange { low: 2, high: 2 },
                BucketRange { low: 3, high: 3 },
            ]
        );
    }

    #[test]
    fn ranges_cover_value_space() {
        for npes in 1usize..=40 {
            let ranges = partition(npes);
            assert_eq!(ranges.len(), npes);
            let mut next = 0u64;
            for range in &ranges {
                assert_eq!(range.low, next);
                next += range.width();
            }
            let r = if npes == 1 { 1 } else { 1u64 << pe_bits(npes) };
            assert_eq!(next, r);
            // Widths differ by at most one, larger ones first
            let widths: Vec<u64> = ranges.iter().map(BucketRange::width).collect();
            assert!(widths.windows(2).all(|w| w[0] >= w[1]));
            assert!(widths[0] - widths[npes - 1] <= 1);
        }
    }

    #[test]
    fn shifted_bucket_skips_tag() {
        let rshft = right_shift(4);
        assert_eq!(rshft, 62);
        let key = 0b11_10u64 << 60;
        assert_eq!(shifted_bucket(key, 0, rshft), 0b11);
        assert_eq!(shifted_bucket(key, 2, rshft), 0b10);
        assert_eq!(shifted_bucket(key, 64, rshft), 0);
    }
}
