//! Stable LSD radix sort over a restricted range of key bits
//!
//! Digits are taken 8 bits at a time, starting at the low end of the span.
//! Bits outside the span never influence the order, so the result is the
//! stable sort of `key & span.mask()`. A digit pass where every key lands in
//! the same pocket is skipped, which is common once the upper bits of a
//! rank's keys are uniform.

use super::BitSpan;
use crate::err::{try_zeroed, Error};

/// Bits per digit
const RADIX_BITS: u32 = 8;

/// Pockets per digit
const POCKETS: usize = 1 << RADIX_BITS;

/// Sort `keys` by the bits of `span`, stable for keys equal under the mask.
pub(super) fn radix_sort(keys: &mut [u64], span: BitSpan) -> Result<(), Error> {
    let n = keys.len();
    if n < 2 || span.is_empty() {
        return Ok(());
    }

    let mut scratch: Vec<u64> = try_zeroed("radix scratch", n)?;
    let mut in_scratch = false;

    let end = span.lo() + span.width();
    let mut shift = span.lo();
    while shift < end {
        let bits = RADIX_BITS.min(end - shift);
        let mask = (1u64 << bits) - 1;
        let (src, dst): (&[u64], &mut [u64]) = if in_scratch {
            (&scratch[..], &mut *keys)
        } else {
            (&*keys, &mut scratch[..])
        };
        if scatter(src, dst, shift, mask) {
            in_scratch = !in_scratch;
        }
        shift += bits;
    }

    if in_scratch {
        keys.copy_from_slice(&scratch);
    }
    Ok(())
}

/// Count and distribute one digit from `src` into `dst`.
///
/// Returns `false` without touching `dst` when every key has the same digit.
fn scatter(src: &[u64], dst: &mut [u64], shift: u32, mask: u64) -> bool {
    let mut counts = [0usize; POCKETS];
    for &key in src {
        counts[((key >> shift) & mask) as usize] += 1;
    }
    if counts.iter().any(|&c| c == src.len()) {
        return false;
    }

    let mut offsets = [0usize; POCKETS];
    let mut sum = 0;
    for (offset, count) in offsets.iter_mut().zip(counts.iter()) {
        *offset = sum;
        sum += count;
    }

    for &key in src {
        let pocket = ((key >> shift) & mask) as usize;
        dst[offsets[pocket]] = key;
        offsets[pocket] += 1;
    }
    true
}
