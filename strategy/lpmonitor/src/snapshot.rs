//! Position snapshot builder.
//!
//! Turns raw position, pool and boundary tick reads into a [`PositionSnapshot`]:
//! range status, distance to each boundary, token composition and unclaimed fees.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use utils::u256_to_f64;

use crate::error::MonitorError;
use crate::pricing::Valuation;
use crate::tick_math::{
    is_full_range, sqrt_price_x96_to_f64, sqrt_price_x96_to_price, tick_to_price,
    tick_to_sqrt_price, validate_range,
};
use crate::types::{PoolRef, PoolState, PositionKey, RangeStatus, RawPosition, TickFeeGrowth};

/// Point-in-time view of one position. Built fresh each poll and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub key: PositionKey,
    pub owner: Address,
    pub pool: PoolRef,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub current_tick: i32,
    /// Token1 per token0
    pub price: f64,
    pub lower_price: f64,
    pub upper_price: f64,
    pub status: RangeStatus,
    pub full_range: bool,
    /// `current_tick - tick_lower`, negative below the range
    pub ticks_above_lower: i64,
    /// `tick_upper - current_tick`, non-positive at or above the range
    pub ticks_below_upper: i64,
    /// Price move in percent from the current price down to the lower bound
    pub lower_distance_pct: Option<f64>,
    /// Price move in percent from the current price up to the upper bound
    pub upper_distance_pct: Option<f64>,
    pub amount0: f64,
    pub amount1: f64,
    pub unclaimed_fees0: f64,
    pub unclaimed_fees1: f64,
    /// Set when fee growth inside read below its last checkpoint and was clamped
    pub fee_inconsistency: bool,
    pub block_number: u64,
    pub timestamp: u64,
}

impl PositionSnapshot {
    /// Value of the token composition, excluding fees.
    pub fn composition_value(&self, valuation: &Valuation) -> f64 {
        valuation.value(self.amount0, self.amount1)
    }

    /// Value of the unclaimed fees.
    pub fn fees_value(&self, valuation: &Valuation) -> f64 {
        valuation.value(self.unclaimed_fees0, self.unclaimed_fees1)
    }

    /// Signed price distance in percent to whichever boundary is closer.
    pub fn nearest_boundary_pct(&self) -> Option<f64> {
        match (self.lower_distance_pct, self.upper_distance_pct) {
            (Some(lower), Some(upper)) if lower.abs() <= upper.abs() => Some(lower),
            (Some(_), Some(upper)) => Some(upper),
            _ => None,
        }
    }
}

/// Fee growth per unit of liquidity accumulated inside `[tick_lower, tick_upper)`.
///
/// All subtractions wrap, matching the on-chain accounting of both Uniswap V3
/// and Algebra pools.
pub fn fee_growth_inside(
    current_tick: i32,
    tick_lower: i32,
    tick_upper: i32,
    fee_growth_global: U256,
    outside_lower: U256,
    outside_upper: U256,
) -> U256 {
    let below = if current_tick >= tick_lower {
        outside_lower
    } else {
        fee_growth_global.wrapping_sub(outside_lower)
    };
    let above = if current_tick < tick_upper {
        outside_upper
    } else {
        fee_growth_global.wrapping_sub(outside_upper)
    };
    fee_growth_global.wrapping_sub(below).wrapping_sub(above)
}

/// Raw fee amount accrued since the last checkpoint, and whether the read was consistent.
///
/// The difference is read as two's complement. A negative difference means the
/// pool and position reads disagree; the accrued amount is clamped to zero.
pub fn accrued_fees(inside: U256, inside_last: U256, liquidity: u128) -> (U256, bool) {
    let delta = inside.wrapping_sub(inside_last);
    if delta.bit(255) {
        return (U256::ZERO, false);
    }
    (mul_shift_128(delta, liquidity), true)
}

/// `delta * liquidity / 2^128` without overflowing 256 bits.
fn mul_shift_128(delta: U256, liquidity: u128) -> U256 {
    let liquidity = U256::from(liquidity);
    let high = delta >> 128usize;
    let low = delta & U256::from(u128::MAX);
    (high * liquidity).saturating_add((low * liquidity) >> 128usize)
}

/// Raw token amounts held by `liquidity` for the given status and sqrt prices.
fn raw_token_amounts(
    status: RangeStatus,
    liquidity: u128,
    sqrt_current: f64,
    sqrt_lower: f64,
    sqrt_upper: f64,
) -> (f64, f64) {
    let liquidity = liquidity as f64;
    match status {
        RangeStatus::BelowRange => (
            liquidity * (sqrt_upper - sqrt_lower) / (sqrt_lower * sqrt_upper),
            0.0,
        ),
        RangeStatus::AboveRange => (0.0, liquidity * (sqrt_upper - sqrt_lower)),
        RangeStatus::InRange => {
            let sqrt_current = sqrt_current.clamp(sqrt_lower, sqrt_upper);
            (
                liquidity * (sqrt_upper - sqrt_current) / (sqrt_current * sqrt_upper),
                liquidity * (sqrt_current - sqrt_lower),
            )
        }
    }
}

/// Builds the snapshot of `raw` against a block-pinned pool read.
///
/// # Errors
/// * `StaleData` when the pool reports a zero price, or an in-range position
///   finds less active liquidity in the pool than it holds itself
/// * `TickMath` when the stored range is inverted or outside the tick limits
pub fn build_snapshot(
    raw: &RawPosition,
    pool: &PoolRef,
    state: &PoolState,
    lower: &TickFeeGrowth,
    upper: &TickFeeGrowth,
    timestamp: u64,
) -> Result<PositionSnapshot, MonitorError> {
    validate_range(raw.tick_lower, raw.tick_upper)?;

    if state.sqrt_price_x96.is_zero() {
        return Err(MonitorError::stale(
            raw.key.to_string(),
            "pool reports zero sqrt price",
        ));
    }

    let status = RangeStatus::classify(state.tick, raw.tick_lower, raw.tick_upper);
    if status.is_in_range() && raw.liquidity > 0 && state.liquidity < raw.liquidity {
        return Err(MonitorError::stale(
            raw.key.to_string(),
            format!(
                "pool active liquidity {} below position liquidity {}",
                state.liquidity, raw.liquidity
            ),
        ));
    }

    let d0 = pool.token0.decimals;
    let d1 = pool.token1.decimals;
    let price = sqrt_price_x96_to_price(state.sqrt_price_x96, d0, d1)?;
    let lower_price = tick_to_price(raw.tick_lower, d0, d1)?;
    let upper_price = tick_to_price(raw.tick_upper, d0, d1)?;

    let (raw0, raw1) = raw_token_amounts(
        status,
        raw.liquidity,
        sqrt_price_x96_to_f64(state.sqrt_price_x96),
        tick_to_sqrt_price(raw.tick_lower)?,
        tick_to_sqrt_price(raw.tick_upper)?,
    );
    let amount0 = raw0 / 10_f64.powi(i32::from(d0));
    let amount1 = raw1 / 10_f64.powi(i32::from(d1));

    let inside0 = fee_growth_inside(
        state.tick,
        raw.tick_lower,
        raw.tick_upper,
        state.fee_growth_global0_x128,
        lower.outside0_x128,
        upper.outside0_x128,
    );
    let inside1 = fee_growth_inside(
        state.tick,
        raw.tick_lower,
        raw.tick_upper,
        state.fee_growth_global1_x128,
        lower.outside1_x128,
        upper.outside1_x128,
    );
    let (accrued0, consistent0) =
        accrued_fees(inside0, raw.fee_growth_inside0_last_x128, raw.liquidity);
    let (accrued1, consistent1) =
        accrued_fees(inside1, raw.fee_growth_inside1_last_x128, raw.liquidity);
    let fee_inconsistency = !(consistent0 && consistent1);
    if fee_inconsistency {
        tracing::warn!(
            position = %raw.key,
            block = state.block_number,
            "fee growth inside below last checkpoint, accrued fees clamped to zero"
        );
    }

    let unclaimed0 = accrued0.saturating_add(U256::from(raw.tokens_owed0));
    let unclaimed1 = accrued1.saturating_add(U256::from(raw.tokens_owed1));

    let full_range = is_full_range(raw.tick_lower, raw.tick_upper);
    let (lower_distance_pct, upper_distance_pct) = if full_range {
        (None, None)
    } else {
        (
            Some((price - lower_price) / price * 100.0),
            Some((upper_price - price) / price * 100.0),
        )
    };

    Ok(PositionSnapshot {
        key: raw.key.clone(),
        owner: raw.owner,
        pool: pool.clone(),
        tick_lower: raw.tick_lower,
        tick_upper: raw.tick_upper,
        liquidity: raw.liquidity,
        current_tick: state.tick,
        price,
        lower_price,
        upper_price,
        status,
        full_range,
        ticks_above_lower: i64::from(state.tick) - i64::from(raw.tick_lower),
        ticks_below_upper: i64::from(raw.tick_upper) - i64::from(state.tick),
        lower_distance_pct,
        upper_distance_pct,
        amount0,
        amount1,
        unclaimed_fees0: u256_to_f64(unclaimed0, u32::from(d0)),
        unclaimed_fees1: u256_to_f64(unclaimed1, u32::from(d1)),
        fee_inconsistency,
        block_number: state.block_number,
        timestamp,
    })
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
