//! Conversions between ticks, Q64.96 sqrt prices and human prices.
//!
//! Prices are always token1 per token0 expressed in whole tokens, so a tick
//! maps to `1.0001^tick * 10^(decimals0 - decimals1)`.

use alloy::primitives::U256;
use thiserror::Error;
use utils::u256_to_f64;

/// Lowest tick a pool can reach.
pub const MIN_TICK: i32 = -887_272;
/// Highest tick a pool can reach.
pub const MAX_TICK: i32 = 887_272;

const TICK_BASE: f64 = 1.0001;
/// 2^96.
const Q96: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// Ranges whose bounds sit this close to the protocol limits count as full range.
const FULL_RANGE_EDGE_TICKS: i32 = 10_000;
/// Ranges wider than this count as full range regardless of their bounds.
const FULL_RANGE_WIDTH_TICKS: i64 = 1_700_000;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TickMathError {
    #[error("tick {0} outside [-887272, 887272]")]
    TickOutOfRange(i32),
    #[error("price {0} is not a positive finite number")]
    InvalidPrice(f64),
    #[error("tick spacing {0} must be positive")]
    InvalidTickSpacing(i32),
    #[error("tick range [{lower}, {upper}) is empty or inverted")]
    InvalidRange { lower: i32, upper: i32 },
}

fn check_tick(tick: i32) -> Result<(), TickMathError> {
    if (MIN_TICK..=MAX_TICK).contains(&tick) {
        Ok(())
    } else {
        Err(TickMathError::TickOutOfRange(tick))
    }
}

fn check_spacing(tick_spacing: i32) -> Result<(), TickMathError> {
    if tick_spacing > 0 {
        Ok(())
    } else {
        Err(TickMathError::InvalidTickSpacing(tick_spacing))
    }
}

fn decimal_scale(decimals0: u8, decimals1: u8) -> f64 {
    10_f64.powi(i32::from(decimals0) - i32::from(decimals1))
}

/// Human price of token0 in token1 at `tick`.
pub fn tick_to_price(tick: i32, decimals0: u8, decimals1: u8) -> Result<f64, TickMathError> {
    check_tick(tick)?;
    Ok(TICK_BASE.powf(f64::from(tick)) * decimal_scale(decimals0, decimals1))
}

/// Nearest usable tick for a human price, honoring decimals and tick spacing.
///
/// Inverse of [`tick_to_price`] within one tick spacing.
pub fn price_to_tick(
    price: f64,
    decimals0: u8,
    decimals1: u8,
    tick_spacing: i32,
) -> Result<i32, TickMathError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TickMathError::InvalidPrice(price));
    }
    raw_price_to_tick(price / decimal_scale(decimals0, decimals1), tick_spacing)
}

/// Nearest usable tick for a raw price (smallest units of token1 per smallest unit of token0).
pub fn raw_price_to_tick(raw_price: f64, tick_spacing: i32) -> Result<i32, TickMathError> {
    if !raw_price.is_finite() || raw_price <= 0.0 {
        return Err(TickMathError::InvalidPrice(raw_price));
    }
    check_spacing(tick_spacing)?;

    let exact = (raw_price.ln() / TICK_BASE.ln()).round();
    let tick = exact.clamp(f64::from(MIN_TICK), f64::from(MAX_TICK)) as i32;
    nearest_usable_tick(tick, tick_spacing)
}

/// Lowest tick that is a multiple of `tick_spacing`.
pub fn min_usable_tick(tick_spacing: i32) -> Result<i32, TickMathError> {
    check_spacing(tick_spacing)?;
    Ok((MIN_TICK / tick_spacing) * tick_spacing)
}

/// Highest tick that is a multiple of `tick_spacing`.
pub fn max_usable_tick(tick_spacing: i32) -> Result<i32, TickMathError> {
    check_spacing(tick_spacing)?;
    Ok((MAX_TICK / tick_spacing) * tick_spacing)
}

/// Rounds `tick` to the closest multiple of `tick_spacing` inside the usable range.
pub fn nearest_usable_tick(tick: i32, tick_spacing: i32) -> Result<i32, TickMathError> {
    check_tick(tick)?;
    let min = min_usable_tick(tick_spacing)?;
    let max = max_usable_tick(tick_spacing)?;

    let spacing = i64::from(tick_spacing);
    let rounded = (i64::from(tick) as f64 / spacing as f64).round() as i64 * spacing;
    Ok(rounded.clamp(i64::from(min), i64::from(max)) as i32)
}

/// Q64.96 sqrt price as a plain f64 sqrt of the raw price.
pub fn sqrt_price_x96_to_f64(sqrt_price_x96: U256) -> f64 {
    u256_to_f64(sqrt_price_x96, 0) / Q96
}

/// Human price of token0 in token1 from a Q64.96 sqrt price.
pub fn sqrt_price_x96_to_price(
    sqrt_price_x96: U256,
    decimals0: u8,
    decimals1: u8,
) -> Result<f64, TickMathError> {
    let sqrt_price = sqrt_price_x96_to_f64(sqrt_price_x96);
    if sqrt_price <= 0.0 {
        return Err(TickMathError::InvalidPrice(sqrt_price));
    }
    Ok(sqrt_price * sqrt_price * decimal_scale(decimals0, decimals1))
}

/// Sqrt of the raw price at `tick`.
pub fn tick_to_sqrt_price(tick: i32) -> Result<f64, TickMathError> {
    check_tick(tick)?;
    Ok(TICK_BASE.powf(f64::from(tick) / 2.0))
}

/// Validates a position range, which must be non-empty and inside the protocol limits.
pub fn validate_range(tick_lower: i32, tick_upper: i32) -> Result<(), TickMathError> {
    check_tick(tick_lower)?;
    check_tick(tick_upper)?;
    if tick_lower >= tick_upper {
        return Err(TickMathError::InvalidRange {
            lower: tick_lower,
            upper: tick_upper,
        });
    }
    Ok(())
}

/// Whether a range effectively covers every price.
pub fn is_full_range(tick_lower: i32, tick_upper: i32) -> bool {
    let near_limits =
        tick_lower <= MIN_TICK + FULL_RANGE_EDGE_TICKS && tick_upper >= MAX_TICK - FULL_RANGE_EDGE_TICKS;
    let width = i64::from(tick_upper) - i64::from(tick_lower);
    near_limits || width > FULL_RANGE_WIDTH_TICKS
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_tick_zero_is_parity() {
        assert!((tick_to_price(0, 18, 18).unwrap() - 1.0).abs() < 1e-15);
        assert!((tick_to_price(0, 6, 18).unwrap() / 1e-12 - 1.0).abs() < 1e-12);
    }

    #[rstest]
    fn test_price_to_tick_round_trip(
        #[values(-887_272, -200_000, -12_345, -1, 0, 1, 60, 123_456, 887_272)] tick: i32,
        #[values(1, 10, 60, 200)] spacing: i32,
        #[values((18, 18), (6, 18), (18, 6), (8, 6))] decimals: (u8, u8),
    ) {
        let (d0, d1) = decimals;
        let price = tick_to_price(tick, d0, d1).unwrap();
        let back = price_to_tick(price, d0, d1, spacing).unwrap();
        assert!(
            (back - tick).abs() <= spacing,
            "tick {tick} spacing {spacing} decimals {d0}/{d1} came back as {back}"
        );
        assert_eq!(back % spacing, 0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_price_to_tick_rejects_invalid_price(#[case] price: f64) {
        assert!(matches!(
            price_to_tick(price, 18, 18, 10),
            Err(TickMathError::InvalidPrice(_))
        ));
    }

    #[rstest]
    fn test_price_to_tick_rejects_bad_spacing() {
        assert_eq!(
            price_to_tick(1.0, 18, 18, 0),
            Err(TickMathError::InvalidTickSpacing(0))
        );
    }

    #[rstest]
    #[case(MIN_TICK - 1)]
    #[case(MAX_TICK + 1)]
    fn test_tick_out_of_range(#[case] tick: i32) {
        assert_eq!(
            tick_to_price(tick, 18, 18),
            Err(TickMathError::TickOutOfRange(tick))
        );
    }

    #[rstest]
    #[case(60, -887_220, 887_220)]
    #[case(1, MIN_TICK, MAX_TICK)]
    #[case(200, -887_200, 887_200)]
    fn test_usable_tick_bounds(#[case] spacing: i32, #[case] min: i32, #[case] max: i32) {
        assert_eq!(min_usable_tick(spacing).unwrap(), min);
        assert_eq!(max_usable_tick(spacing).unwrap(), max);
    }

    #[rstest]
    #[case(44, 10, 40)]
    #[case(45, 10, 50)]
    #[case(-44, 10, -40)]
    #[case(MAX_TICK, 60, 887_220)]
    #[case(MIN_TICK, 60, -887_220)]
    fn test_nearest_usable_tick(#[case] tick: i32, #[case] spacing: i32, #[case] expected: i32) {
        assert_eq!(nearest_usable_tick(tick, spacing).unwrap(), expected);
    }

    #[rstest]
    fn test_sqrt_price_x96_parity() {
        let one = U256::from(1u64) << 96;
        assert!((sqrt_price_x96_to_price(one, 18, 18).unwrap() - 1.0).abs() < 1e-15);
        assert!((sqrt_price_x96_to_price(one, 6, 18).unwrap() / 1e-12 - 1.0).abs() < 1e-12);
    }

    #[rstest]
    fn test_sqrt_price_x96_zero_is_invalid() {
        assert!(sqrt_price_x96_to_price(U256::ZERO, 18, 18).is_err());
    }

    #[rstest]
    fn test_sqrt_price_matches_tick_price() {
        let sqrt = tick_to_sqrt_price(20_000).unwrap();
        let price = tick_to_price(20_000, 18, 18).unwrap();
        assert!((sqrt * sqrt - price).abs() / price < 1e-12);
    }

    #[rstest]
    #[case(100, 200, true)]
    #[case(200, 100, false)]
    #[case(100, 100, false)]
    #[case(MIN_TICK - 10, 0, false)]
    fn test_validate_range(#[case] lower: i32, #[case] upper: i32, #[case] ok: bool) {
        assert_eq!(validate_range(lower, upper).is_ok(), ok);
    }

    #[rstest]
    #[case(-887_220, 887_220, true)]
    #[case(-877_272, 877_272, true)]
    #[case(-850_000, 850_001, true)]
    #[case(-200_000, 200_000, false)]
    #[case(100, 200, false)]
    fn test_is_full_range(#[case] lower: i32, #[case] upper: i32, #[case] expected: bool) {
        assert_eq!(is_full_range(lower, upper), expected);
    }
}
