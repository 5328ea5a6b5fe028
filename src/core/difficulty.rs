// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/difficulty.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Target and difficulty math for the pool clients, located in the core
// subdirectory. A target is a 32-byte big-endian integer; a hash solves it
// when its integer value is strictly below it. Difficulty converts through
// the fixed diff-1 reference target at f64 precision.
//
// Tree Location:
// - src/core/difficulty.rs (target/difficulty conversions)
// - Depends on: uint, thiserror

use thiserror::Error;
use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

/// What a solution hash must stay strictly below
pub type Target = [u8; 32];

/// The difficulty-1 reference target, 0x00000000FFFF0000...0
pub const DIFF_ONE: Target = [
    0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("Negative or zero difficulty")]
    NonPositive,
    #[error("Target is too high")]
    Overflow,
}

/// Convert an f64 into a U256, preserving the full 53-bit mantissa
fn u256_from_f64(x: f64) -> Result<U256, TargetError> {
    if !(x > 0.0) {
        return Err(TargetError::NonPositive);
    }
    if x >= 2f64.powi(256) {
        return Err(TargetError::Overflow);
    }
    if x < 1.0 {
        return Ok(U256::zero());
    }
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7FF) as i64 - 1075;
    let mantissa = (bits & ((1u64 << 52) - 1)) | (1u64 << 52);
    let m = U256::from(mantissa);
    if exponent >= 0 {
        Ok(m << (exponent as usize))
    } else {
        Ok(m >> ((-exponent) as usize))
    }
}

/// Approximate a U256 as f64 using its top 53 bits
fn u256_to_f64(v: U256) -> f64 {
    let bits = v.bits();
    if bits == 0 {
        return 0.0;
    }
    if bits <= 64 {
        v.low_u64() as f64
    } else {
        let shift = bits - 64;
        (v >> shift).low_u64() as f64 * 2f64.powi(shift as i32)
    }
}

/// target = diff1 / difficulty, clamped to 256 bits. The division happens at
/// f64 precision, which is what every pool on the other side uses too.
pub fn difficulty_to_target(difficulty: f64) -> Result<Target, TargetError> {
    let diff_one = u256_to_f64(U256::from_big_endian(&DIFF_ONE));
    let quotient = u256_from_f64(diff_one / difficulty)?;
    let mut target = [0u8; 32];
    target.copy_from_slice(&quotient.to_big_endian());
    Ok(target)
}

/// Inverse of difficulty_to_target, for display of pools that only push
/// raw targets
pub fn target_to_difficulty(target: &Target) -> f64 {
    let t = U256::from_big_endian(target);
    if t.is_zero() {
        return 0.0;
    }
    u256_to_f64(U256::from_big_endian(&DIFF_ONE)) / u256_to_f64(t)
}

/// A hash solves the target when its 256-bit value is strictly below it
pub fn hash_meets_target(hash: &[u8], target: &[u8]) -> bool {
    U256::from_big_endian(hash) < U256::from_big_endian(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_one_is_diff_one() {
        assert_eq!(difficulty_to_target(1.0).unwrap(), DIFF_ONE);
    }

    #[test]
    fn test_difficulty_to_target_dyadic() {
        // 0xFFFF << 208 divided by 2^16 is exactly 0xFFFF << 192
        let target = difficulty_to_target(65536.0).unwrap();
        let mut expected = [0u8; 32];
        expected[6] = 0xFF;
        expected[7] = 0xFF;
        assert_eq!(target, expected);

        let target = difficulty_to_target(256.0).unwrap();
        let expected = U256::from_big_endian(&DIFF_ONE) >> 8;
        assert_eq!(U256::from_big_endian(&target), expected);
    }

    #[test]
    fn test_difficulty_round_trip() {
        // the classic 0x404CB pool example and the scratch value the legacy
        // test file carried; neither is dyadic so check the round trip
        for d in [65.32477875f64, 16307.420938523983, 3.7, 1000000.0] {
            let target = difficulty_to_target(d).unwrap();
            let back = target_to_difficulty(&target);
            assert!(
                (back - d).abs() / d < 1e-9,
                "round trip drifted: {} -> {}",
                d,
                back
            );
        }
    }

    #[test]
    fn test_difficulty_rejects_junk() {
        assert_eq!(difficulty_to_target(0.0), Err(TargetError::NonPositive));
        assert_eq!(difficulty_to_target(-4.0), Err(TargetError::NonPositive));
    }

    #[test]
    fn test_hash_meets_target_is_strict() {
        let target = difficulty_to_target(65536.0).unwrap();
        assert!(!hash_meets_target(&target, &target));

        let mut below = target;
        below[31] = 0x00;
        let mut above = target;
        above[5] = 0xFF;
        assert!(hash_meets_target(&below, &target) || below == target);
        assert!(!hash_meets_target(&above, &target));

        let zero = [0u8; 32];
        assert!(hash_meets_target(&zero, &target));
    }

    #[test]
    fn test_target_ordering_follows_difficulty() {
        let easy = difficulty_to_target(2.0).unwrap();
        let hard = difficulty_to_target(4096.0).unwrap();
        assert!(U256::from_big_endian(&hard) < U256::from_big_endian(&easy));
    }
}

// Changelog:
// - v0.2.0: Replaced the u64 shortcut with full 256-bit targets; conversions
//   keep the f64 mantissa bit for bit.
// - v0.1.0: Initial diff1 constant and strict-compare check.
