//! Identifiers and raw chain data shared by the analytics modules.

use std::fmt;

use alloy::primitives::{Address, U256};
use clients_clmm::{DexFlavor, PoolStateData, PositionData, TickData};
use serde::{Deserialize, Serialize};

/// Unique key of a tracked position: DEX name plus position NFT id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub dex: String,
    pub token_id: U256,
}

impl PositionKey {
    pub fn new(dex: impl Into<String>, token_id: U256) -> Self {
        Self {
            dex: dex.into(),
            token_id,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.dex, self.token_id)
    }
}

/// Token as displayed and scaled by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: Address,
    /// Display symbol after alias mapping
    pub symbol: String,
    pub decimals: u8,
}

/// Immutable description of a pool, discovered once per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRef {
    pub dex: String,
    pub flavor: DexFlavor,
    pub address: Address,
    pub token0: TokenRef,
    pub token1: TokenRef,
    pub tick_spacing: i32,
    /// Fee tier in hundredths of a bip, absent for dynamic-fee pools
    pub fee_tier: Option<u32>,
}

impl PoolRef {
    /// `HYPE/USDC 0.30%` style label.
    pub fn label(&self) -> String {
        match self.fee_tier {
            Some(fee) => format!(
                "{}/{} {:.2}%",
                self.token0.symbol,
                self.token1.symbol,
                f64::from(fee) / 10_000.0
            ),
            None => format!("{}/{}", self.token0.symbol, self.token1.symbol),
        }
    }
}

/// Cache key of a [`PoolRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub dex: String,
    pub token0: Address,
    pub token1: Address,
    pub fee: Option<u32>,
    /// Custom Algebra pool deployer
    pub deployer: Option<Address>,
}

/// Position as stored by the position manager, tagged with its key and owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPosition {
    pub key: PositionKey,
    pub owner: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee: Option<u32>,
    pub deployer: Option<Address>,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub fee_growth_inside0_last_x128: U256,
    pub fee_growth_inside1_last_x128: U256,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
}

impl RawPosition {
    pub fn from_client(dex: &str, owner: Address, data: PositionData) -> Self {
        Self {
            key: PositionKey::new(dex, data.token_id),
            owner,
            token0: data.token0,
            token1: data.token1,
            fee: data.fee,
            deployer: data.deployer,
            tick_lower: data.tick_lower,
            tick_upper: data.tick_upper,
            liquidity: data.liquidity,
            fee_growth_inside0_last_x128: data.fee_growth_inside0_last_x128,
            fee_growth_inside1_last_x128: data.fee_growth_inside1_last_x128,
            tokens_owed0: data.tokens_owed0,
            tokens_owed1: data.tokens_owed1,
        }
    }

    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            dex: self.key.dex.clone(),
            token0: self.token0,
            token1: self.token1,
            fee: self.fee,
            deployer: self.deployer.filter(|deployer| !deployer.is_zero()),
        }
    }
}

/// Pool state pinned to one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub tick: i32,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub fee_growth_global0_x128: U256,
    pub fee_growth_global1_x128: U256,
    pub block_number: u64,
}

impl PoolState {
    pub fn from_client(data: PoolStateData, block_number: u64) -> Self {
        Self {
            tick: data.tick,
            sqrt_price_x96: data.sqrt_price_x96,
            liquidity: data.liquidity,
            fee_growth_global0_x128: data.fee_growth_global0_x128,
            fee_growth_global1_x128: data.fee_growth_global1_x128,
            block_number,
        }
    }
}

/// Fee growth on the far side of a boundary tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickFeeGrowth {
    pub outside0_x128: U256,
    pub outside1_x128: U256,
}

impl From<TickData> for TickFeeGrowth {
    fn from(data: TickData) -> Self {
        Self {
            outside0_x128: data.fee_growth_outside0_x128,
            outside1_x128: data.fee_growth_outside1_x128,
        }
    }
}

/// Where the current tick sits relative to a position range `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    InRange,
    /// Current tick below the lower bound, position is entirely token0
    BelowRange,
    /// Current tick at or above the upper bound, position is entirely token1
    AboveRange,
}

impl RangeStatus {
    pub fn classify(current_tick: i32, tick_lower: i32, tick_upper: i32) -> Self {
        if current_tick < tick_lower {
            Self::BelowRange
        } else if current_tick >= tick_upper {
            Self::AboveRange
        } else {
            Self::InRange
        }
    }

    pub fn is_in_range(self) -> bool {
        matches!(self, Self::InRange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(150, RangeStatus::InRange)]
    #[case(100, RangeStatus::InRange)]
    #[case(200, RangeStatus::AboveRange)]
    #[case(99, RangeStatus::BelowRange)]
    fn test_range_is_closed_open(#[case] tick: i32, #[case] expected: RangeStatus) {
        assert_eq!(RangeStatus::classify(tick, 100, 200), expected);
    }

    #[rstest]
    fn test_position_key_display() {
        let key = PositionKey::new("HyperSwap", U256::from(42u64));
        assert_eq!(key.to_string(), "HyperSwap#42");
    }

    #[rstest]
    fn test_custom_deployer_gets_its_own_pool_key() {
        let data = |deployer: Address| PositionData {
            token_id: U256::from(7u64),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            fee: None,
            deployer: Some(deployer),
            tick_lower: -60,
            tick_upper: 60,
            liquidity: 1,
            fee_growth_inside0_last_x128: U256::ZERO,
            fee_growth_inside1_last_x128: U256::ZERO,
            tokens_owed0: 0,
            tokens_owed1: 0,
        };
        let owner = Address::repeat_byte(0x11);
        let default = RawPosition::from_client("GLiquid", owner, data(Address::ZERO)).pool_key();
        let custom =
            RawPosition::from_client("GLiquid", owner, data(Address::repeat_byte(0x42))).pool_key();

        assert_eq!(default.deployer, None);
        assert_eq!(custom.deployer, Some(Address::repeat_byte(0x42)));
        assert_ne!(default, custom);
    }

    #[rstest]
    fn test_pool_label() {
        let token = |symbol: &str| TokenRef {
            address: Address::ZERO,
            symbol: symbol.to_string(),
            decimals: 18,
        };
        let mut pool = PoolRef {
            dex: "HyperSwap".to_string(),
            flavor: DexFlavor::UniswapV3,
            address: Address::ZERO,
            token0: token("HYPE"),
            token1: token("USDC"),
            tick_spacing: 60,
            fee_tier: Some(3000),
        };
        assert_eq!(pool.label(), "HYPE/USDC 0.30%");
        pool.fee_tier = None;
        assert_eq!(pool.label(), "HYPE/USDC");
    }
}
