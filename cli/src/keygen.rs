//! Synthetic pre-tagged keys

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random keys for one rank.
///
/// Every key carries `tag` in its top `bbits` bits; the bits below are
/// uniform random. Each rank draws from its own stream derived from `seed`.
pub(crate) fn tagged_keys(rank: usize, count: usize, bbits: u32, tag: u64, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed ^ (rank as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    let tag_bits = tag.checked_shl(u64::BITS - bbits).unwrap_or(0);
    let value_mask = u64::MAX.checked_shr(bbits).unwrap_or(0);
    (0..count)
        .map(|_| tag_bits | (rng.gen::<u64>() & value_mask))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keys_carry_the_tag() {
        let keys = tagged_keys(1, 500, 3, 0b101, 7);
        assert_eq!(keys.len(), 500);
        assert!(keys.iter().all(|k| k >> 61 == 0b101));
    }

    #[test]
    fn ranks_draw_different_streams() {
        assert_ne!(tagged_keys(0, 8, 0, 0, 1), tagged_keys(1, 8, 0, 0, 1));
        assert_eq!(tagged_keys(2, 8, 0, 0, 1), tagged_keys(2, 8, 0, 0, 1));
    }

    #[test]
    fn whole_key_tag() {
        assert_eq!(tagged_keys(0, 3, 64, 42, 1), vec![42; 3]);
    }
}
