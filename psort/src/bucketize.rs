//! Classify a sorted local array into per-destination send counts

use crate::err::{try_zeroed, Error};
use crate::partition::{shifted_bucket, BucketRange};

/// The bucket tag shared by every key of `keys`: its top `bbits` bits.
///
/// Returns `None` for an empty array or when there are no tag bits, and
/// [`Error::MixedTags`] when the keys disagree.
pub(crate) fn local_tag(keys: &[u64], bbits: u32) -> Result<Option<u64>, Error> {
    if bbits == 0 {
        return Ok(None);
    }
    let shift = u64::BITS - bbits;
    let mut tags = keys.iter().map(|&k| k >> shift);
    let Some(first) = tags.next() else {
        return Ok(None);
    };
    let (low, high) = tags.fold((first, first), |(low, high), t| (low.min(t), high.max(t)));
    if low != high {
        return Err(Error::MixedTags { low, high });
    }
    Ok(Some(first))
}

/// Count how many keys of the sorted array `keys` go to each rank.
///
/// The array must be ordered by shifted bucket value. One forward scan
/// assigns the leading run of keys inside `ranges[0]` to rank 0, the next run
/// to rank 1 and so on. The scan stops at the end of the array, leaving zero
/// counts for any ranks still unvisited.
///
/// Returns [`Error::Unordered`] if keys remain after the last range, which
/// only happens when the ordering precondition doesn't hold.
pub(crate) fn bucketize(
    keys: &[u64],
    bbits: u32,
    rshft: u32,
    ranges: &[BucketRange],
) -> Result<Vec<usize>, Error> {
    let mut sends: Vec<usize> = try_zeroed("send counts", ranges.len())?;

    let mut cursor = 0;
    for (send, range) in sends.iter_mut().zip(ranges) {
        let start = cursor;
        while cursor < keys.len() && range.contains(shifted_bucket(keys[cursor], bbits, rshft)) {
            cursor += 1;
        }
        *send = cursor - start;
    }

    if cursor != keys.len() {
        return Err(Error::Unordered {
            unassigned: keys.len() - cursor,
            total: keys.len(),
        });
    }
    Ok(sends)
}
