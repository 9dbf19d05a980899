//! Configuration types for CLMM clients.

use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Contract family a DEX deployment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexFlavor {
    /// NonfungiblePositionManager + `slot0` pools with a fixed fee tier.
    #[default]
    UniswapV3,
    /// Algebra Integral position manager + `globalState` pools with dynamic fees.
    AlgebraIntegral,
}

impl fmt::Display for DexFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniswapV3 => f.write_str("uniswap_v3"),
            Self::AlgebraIntegral => f.write_str("algebra_integral"),
        }
    }
}

/// Configuration for a position manager client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionManagerConfig {
    /// The contract address of the position manager
    pub address: Address,
    /// Contract family of the deployment
    #[serde(default)]
    pub flavor: DexFlavor,
}
