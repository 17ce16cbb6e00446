//! Recursive quicksort with parallel task fan-out
//!
//! Partitions are independent once split, so large halves are handed to
//! [`rayon::join`]. Small subarrays fall back to insertion sort.

use super::insertion;

/// Subarrays at or below this length use insertion sort
const INSERTION_CUTOFF: usize = 10;

/// Subarrays at or above this length sort their two halves in parallel
const PARALLEL_CUTOFF: usize = 1 << 14;

/// Sort `keys` ascending in place.
pub(super) fn quicksort(keys: &mut [u64]) {
    if keys.len() <= INSERTION_CUTOFF {
        insertion(keys);
        return;
    }

    let split = partition(keys);
    let (left, right) = keys.split_at_mut(split);
    // right[0] is the pivot, already in its final position
    let right = &mut right[1..];

    if left.len() + right.len() >= PARALLEL_CUTOFF {
        rayon::join(|| quicksort(left), || quicksort(right));
    } else {
        quicksort(left);
        quicksort(right);
    }
}

/// Median-of-three partition, returning the final pivot index.
///
/// Requires more than [`INSERTION_CUTOFF`] elements. After the median step
/// `keys[0] <= pivot` and `keys[high - 1] == pivot` act as sentinels for the
/// two inner scans.
fn partition(keys: &mut [u64]) -> usize {
    debug_assert!(keys.len() > INSERTION_CUTOFF);
    let high = keys.len() - 1;
    let middle = high / 2;

    if keys[middle] < keys[0] {
        keys.swap(middle, 0);
    }
    if keys[high] < keys[0] {
        keys.swap(high, 0);
    }
    if keys[high] < keys[middle] {
        keys.swap(high, middle);
    }

    keys.swap(middle, high - 1);
    let pivot = keys[high - 1];

    let mut i = 0;
    let mut j = high - 1;
    loop {
        i += 1;
        while keys[i] < pivot {
            i += 1;
        }
        j -= 1;
        while pivot < keys[j] {
            j -= 1;
        }
        if i >= j {
            break;
        }
        keys.swap(i, j);
    }
    keys.swap(i, high - 1);
    i
}
