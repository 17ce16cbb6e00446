//! Process-local sorting of key arrays
//!
//! Both the first local sort and the final sort go through [`local_sort`].
//! The comparison sorts always order by the full 64-bit key. The radix sort
//! only looks at the bits inside a [`BitSpan`], which the caller narrows when
//! the bits outside it are known to be uniform across the array.

mod quick;
mod radix;

use crate::err::Error;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Local sort strategy
///
/// The string forms match the option values of the benchmark driver:
/// `insert`, `select`, `bubble`, `qsort` and `radix`.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SortAlgorithm {
    /// Insertion sort
    #[strum(serialize = "insert")]
    #[serde(rename = "insert")]
    Insertion,
    /// Selection sort
    #[strum(serialize = "select")]
    #[serde(rename = "select")]
    Selection,
    /// Bubble sort with early exit
    Bubble,
    /// Median-of-three quicksort, halves sorted in parallel when large
    #[strum(serialize = "qsort")]
    #[serde(rename = "qsort")]
    Quick,
    /// Stable LSD radix sort restricted to a [`BitSpan`]
    #[default]
    Radix,
}

/// Inclusive range of key bit positions, bit 0 being the least significant
///
/// A span may be empty, which means no bits take part in the ordering and
/// any array is already sorted under it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BitSpan {
    /// Lowest bit position
    lo: u32,
    /// Number of bits, starting at `lo`
    width: u32,
}

impl BitSpan {
    /// All 64 bits.
    pub const FULL: BitSpan = BitSpan { lo: 0, width: 64 };

    /// The span `[lo, hi]`, or `None` if `hi` is below `lo` or past bit 63.
    pub fn new(lo: u32, hi: u32) -> Option<Self> {
        if hi < lo || hi >= u64::BITS {
            return None;
        }
        Some(Self {
            lo,
            width: hi - lo + 1,
        })
    }

    /// The lowest `width` bits, `[0, width - 1]`. Widths past 64 saturate.
    pub fn low(width: u32) -> Self {
        Self {
            lo: 0,
            width: width.min(u64::BITS),
        }
    }

    /// Span left over after the `top` most significant bits are known to
    /// be uniform.
    pub fn below_top(top: u32) -> Self {
        Self::low(u64::BITS.saturating_sub(top))
    }

    /// Lowest bit position.
    pub fn lo(&self) -> u32 {
        self.lo
    }

    /// Highest bit position, or `None` for an empty span.
    pub fn hi(&self) -> Option<u32> {
        (self.width > 0).then(|| self.lo + self.width - 1)
    }

    /// Number of bits in the span.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Does the span cover no bits at all?
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Mask selecting the bits of the span.
    pub fn mask(&self) -> u64 {
        match self.width {
            0 => 0,
            w if w >= u64::BITS => u64::MAX,
            w => ((1u64 << w) - 1) << self.lo,
        }
    }
}

impl Default for BitSpan {
    fn default() -> Self {
        Self::FULL
    }
}

/// Sort `keys` ascending in place with the selected algorithm.
///
/// `span` only affects [`SortAlgorithm::Radix`]. An empty array is left
/// untouched without invoking any algorithm.
///
/// Radix sort needs a scratch buffer as large as the input; failing to
/// allocate it is reported as [`Error::Allocation`].
pub fn local_sort(algorithm: SortAlgorithm, keys: &mut [u64], span: BitSpan) -> Result<(), Error> {
    if keys.is_empty() {
        return Ok(());
    }
    match algorithm {
        SortAlgorithm::Insertion => insertion(keys),
        SortAlgorithm::Selection => selection(keys),
        SortAlgorithm::Bubble => bubble(keys),
        SortAlgorithm::Quick => quick::quicksort(keys),
        SortAlgorithm::Radix => radix::radix_sort(keys, span)?,
    }
    Ok(())
}

/// Insertion sort, shifting larger elements right until the hole fits.
pub(crate) fn insertion(keys: &mut [u64]) {
    for i in 1..keys.len() {
        let look = keys[i];
        let mut j = i;
        while j > 0 && keys[j - 1] > look {
            keys[j] = keys[j - 1];
            j -= 1;
        }
        keys[j] = look;
    }
}

/// Selection sort: place the minimum of the unsorted suffix at its front.
fn selection(keys: &mut [u64]) {
    let n = keys.len();
    for i in 0..n.saturating_sub(1) {
        let mut min = i;
        for j in (i + 1)..n {
            if keys[j] < keys[min] {
                min = j;
            }
        }
        if min != i {
            keys.swap(i, min);
        }
    }
}

/// Bubble sort, stopping after the first pass without swaps.
fn bubble(keys: &mut [u64]) {
    let mut end = keys.len();
    while end > 1 {
        let mut last_swap = 0;
        for i in 1..end {
            if keys[i - 1] > keys[i] {
                keys.swap(i - 1, i);
                last_swap = i;
            }
        }
        end = last_swap;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn random_keys(seed: u64, len: usize) -> Vec<u64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen()).collect()
    }

    #[test]
    fn names_round_trip() {
        for (name, algorithm) in [
            ("insert", SortAlgorithm::Insertion),
            ("select", SortAlgorithm::Selection),
            ("bubble", SortAlgorithm::Bubble),
            ("qsort", SortAlgorithm::Quick),
            ("radix", SortAlgorithm::Radix),
        ] {
            assert_eq!(SortAlgorithm::from_str(name), Ok(algorithm));
            assert_eq!(algorithm.to_string(), name);
        }
        assert!(SortAlgorithm::from_str("heap").is_err());
    }

    #[test]
    fn every_algorithm_sorts() {
        for algorithm in SortAlgorithm::iter() {
            for len in [1usize, 2, 3, 10, 11, 100, 777] {
                let mut keys = random_keys(len as u64, len);
                let mut expected = keys.clone();
                expected.sort_unstable();
                local_sort(algorithm, &mut keys, BitSpan::FULL).unwrap();
                assert_eq!(keys, expected, "{algorithm} len {len}");
            }
        }
    }

    #[test]
    fn duplicates_and_reversed() {
        for algorithm in SortAlgorithm::iter() {
            let mut keys: Vec<u64> = (0..500u64).rev().map(|k| k % 7).collect();
            let mut expected = keys.clone();
            expected.sort_unstable();
            local_sort(algorithm, &mut keys, BitSpan::FULL).unwrap();
            assert_eq!(keys, expected, "{algorithm}");
        }
    }

    #[test]
    fn empty_is_noop() {
        for algorithm in SortAlgorithm::iter() {
            let mut keys: Vec<u64> = vec![];
            local_sort(algorithm, &mut keys, BitSpan::low(0)).unwrap();
            assert!(keys.is_empty());
        }
    }

    #[test]
    fn span_accessors() {
        let span = BitSpan::new(4, 11).unwrap();
        assert_eq!(span.lo(), 4);
        assert_eq!(span.hi(), Some(11));
        assert_eq!(span.mask(), 0xff0);
        assert!(BitSpan::new(5, 4).is_none());
        assert!(BitSpan::new(0, 64).is_none());
        assert_eq!(BitSpan::FULL.mask(), u64::MAX);
        assert_eq!(BitSpan::below_top(4), BitSpan::new(0, 59).unwrap());
        assert!(BitSpan::below_top(64).is_empty());
        assert_eq!(BitSpan::below_top(64).hi(), None);
        assert_eq!(BitSpan::low(70), BitSpan::FULL);
    }
}
