//! Compact-target expansion and the difficulty retarget algorithm
//! (spec.md §4.1, §4.7), generalized from the teacher's
//! `consensus::difficulty::CompactDifficulty` (a `u64`-difficulty model) to
//! literal 256-bit targets: a proof-of-work target can be far larger than
//! fits in a `u64`, so comparisons work directly on big-endian byte arrays,
//! which compare lexicographically exactly as unsigned integers would.

use primitive_types::U256;

/// Expands a compact ("nBits") 32-bit value into a full 256-bit target,
/// represented as big-endian bytes.
pub fn expand_compact(bits: u32) -> [u8; 32] {
    let exponent = (bits >> 24) as usize;
    let mantissa = U256::from(bits & 0x007F_FFFF);
    let target = if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    };
    let mut out = [0u8; 32];
    target.to_big_endian(&mut out);
    out
}

/// Encodes a 256-bit big-endian target back into compact form.
pub fn encode_compact(target_be: &[u8; 32]) -> u32 {
    let value = U256::from_big_endian(target_be);
    if value.is_zero() {
        return 0;
    }
    let byte_len = (value.bits() + 7) / 8;
    let mut size = byte_len as u32;
    let mut compact: u32 = if size <= 3 {
        (value << (8 * (3 - size) as usize)).low_u32()
    } else {
        (value >> (8 * (size - 3) as usize)).low_u32()
    };
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Cumulative chain work contributed by a single block at `target`:
/// `2^256 / (target + 1)`.
pub fn block_work(target_be: &[u8; 32]) -> U256 {
    let target = U256::from_big_endian(target_be);
    // U256::MAX == 2^256 - 1, so (!target) + 1 == 2^256 - target when target != 0;
    // dividing that by (target + 1) gives 2^256 / (target + 1) without overflowing.
    let denom = target + U256::one();
    if denom.is_zero() {
        return U256::zero();
    }
    (U256::MAX - target) / denom + U256::one()
}

/// Clamps `elapsed` into `[timespan/4, timespan*4]` as the retarget
/// algorithm requires (spec.md §4.7).
pub fn clamp_timespan(elapsed: i64, target_timespan: i64) -> i64 {
    elapsed.clamp(target_timespan / 4, target_timespan * 4)
}

/// Computes the retargeted difficulty: `min(prev_target * elapsed / timespan,
/// proof_of_work_limit)`.
pub fn retarget(
    prev_target_be: &[u8; 32],
    elapsed: i64,
    target_timespan: i64,
    proof_of_work_limit_be: &[u8; 32],
) -> [u8; 32] {
    let prev = U256::from_big_endian(prev_target_be);
    let clamped = clamp_timespan(elapsed, target_timespan);
    let new_target = prev * U256::from(clamped as u64) / U256::from(target_timespan as u64);
    let limit = U256::from_big_endian(proof_of_work_limit_be);
    let bounded = new_target.min(limit);
    let mut out = [0u8; 32];
    bounded.to_big_endian(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_then_encode_round_trips() {
        for bits in [0x1D00_FFFFu32, 0x207F_FFFF, 0x1D0F_FFFF, 0x0403_0000] {
            let target = expand_compact(bits);
            assert_eq!(encode_compact(&target), bits, "for bits {bits:#x}");
        }
    }

    #[test]
    fn lower_hash_meets_higher_target() {
        let target = expand_compact(0x1D00_FFFF);
        let easy_hash = [0u8; 32];
        let hard_hash = [0xFFu8; 32];
        assert!(easy_hash <= target);
        assert!(hard_hash > target);
    }

    #[test]
    fn retarget_doubles_when_blocks_take_twice_as_long() {
        // A prev target well under the limit so the doubled result isn't
        // clipped, letting us check the arithmetic directly.
        let prev_target = expand_compact(0x1C7F_FFFF);
        let limit = expand_compact(0x207F_FFFF);
        let prev = U256::from_big_endian(&prev_target);
        let doubled = retarget(&prev_target, 400, 200, &limit);
        assert_eq!(U256::from_big_endian(&doubled), prev * U256::from(2u32));
    }

    #[test]
    fn retarget_respects_quadrupling_clamp() {
        let prev_target = expand_compact(0x1D00_FFFF);
        let limit = expand_compact(0x1D00_FFFF);
        let way_too_slow = retarget(&prev_target, 100_000, 200, &limit);
        let quadrupled = retarget(&prev_target, 800, 200, &limit);
        assert_eq!(way_too_slow, quadrupled);
    }
}
