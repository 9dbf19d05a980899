//! Shared numeric and clock helpers for the lp-monitor workspace.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::U256;

/// 2^64 as f64, the weight of one limb.
const LIMB_WEIGHT: f64 = 18_446_744_073_709_551_616.0;

/// Converts a U256 value to f64, accounting for token decimals.
///
/// Values that fit in a `u128` keep the integer and fractional parts apart
/// before converting. Larger values are folded limb by limb, which loses
/// precision beyond the f64 mantissa but never truncates the magnitude.
pub fn u256_to_f64(value: U256, decimals: u32) -> f64 {
    if value <= U256::from(u128::MAX) && decimals <= 38 {
        let value_u128 = value.to::<u128>();
        let divisor = 10_u128.pow(decimals);
        let whole_part = value_u128 / divisor;
        let fractional_part = value_u128 % divisor;
        return whole_part as f64 + (fractional_part as f64 / divisor as f64);
    }

    let raw = value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0_f64, |acc, limb| acc * LIMB_WEIGHT + *limb as f64);
    raw / 10_f64.powi(decimals as i32)
}

/// Converts a raw `u128` token amount to f64 with the given decimals.
pub fn u128_to_f64(value: u128, decimals: u32) -> f64 {
    u256_to_f64(U256::from(value), decimals)
}

/// Seconds since the unix epoch. A clock set before 1970 reads as zero.
pub fn unix_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
