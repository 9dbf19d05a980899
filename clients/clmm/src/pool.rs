//! Pool reads for both supported contract families.

use std::time::Duration;

use alloy::eips::BlockId;
use alloy::primitives::aliases::{I24, U24};
use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;

use crate::config::DexFlavor;
use crate::contracts::{IAlgebraFactory, IAlgebraPool, IUniswapV3Factory, IUniswapV3Pool};
use crate::error::{with_timeout, ClmmError};

/// Price and fee accounting state of a pool at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStateData {
    /// Current sqrt price as a Q64.96 value
    pub sqrt_price_x96: U256,
    /// Current tick
    pub tick: i32,
    /// Liquidity active at the current tick
    pub liquidity: u128,
    /// Global fee growth per unit of liquidity for token0, Q128.128
    pub fee_growth_global0_x128: U256,
    /// Global fee growth per unit of liquidity for token1, Q128.128
    pub fee_growth_global1_x128: U256,
}

/// Fee growth recorded on the far side of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickData {
    pub fee_growth_outside0_x128: U256,
    pub fee_growth_outside1_x128: U256,
}

/// Factory entry point resolving an Algebra pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlgebraLookup {
    Default,
    Custom(Address),
}

impl AlgebraLookup {
    /// A zero or missing deployer means the factory's default deployer.
    fn for_deployer(deployer: Option<Address>) -> Self {
        match deployer {
            Some(deployer) if !deployer.is_zero() => Self::Custom(deployer),
            _ => Self::Default,
        }
    }
}

/// Reads factories and pools, dispatching on [`DexFlavor`].
#[derive(Clone)]
pub struct PoolClient {
    provider: DynProvider,
    timeout: Duration,
}

impl PoolClient {
    pub fn new(provider: DynProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Resolves the pool for a token pair through the factory.
    ///
    /// Uniswap V3 factories need the fee tier. Algebra factories ignore it and
    /// look up custom pools by the deployer the position was minted through.
    pub async fn pool_address(
        &self,
        flavor: DexFlavor,
        factory: Address,
        token0: Address,
        token1: Address,
        fee: Option<u32>,
        deployer: Option<Address>,
    ) -> Result<Address, ClmmError> {
        let pool = match flavor {
            DexFlavor::UniswapV3 => {
                const CALL: &str = "getPool";
                let fee = fee.ok_or_else(|| ClmmError::Decode {
                    call: CALL.to_string(),
                    reason: "uniswap v3 position without fee tier".to_string(),
                })?;
                let fee = U24::try_from(fee).map_err(|_| ClmmError::Decode {
                    call: CALL.to_string(),
                    reason: format!("fee tier {fee} exceeds uint24"),
                })?;
                let factory = IUniswapV3Factory::new(factory, self.provider.clone());
                with_timeout(CALL, self.timeout, factory.getPool(token0, token1, fee).call())
                    .await?
                    .map_err(|e| ClmmError::from_contract(CALL, e))?
            }
            DexFlavor::AlgebraIntegral => {
                let factory = IAlgebraFactory::new(factory, self.provider.clone());
                match AlgebraLookup::for_deployer(deployer) {
                    AlgebraLookup::Default => {
                        const CALL: &str = "poolByPair";
                        with_timeout(CALL, self.timeout, factory.poolByPair(token0, token1).call())
                            .await?
                            .map_err(|e| ClmmError::from_contract(CALL, e))?
                    }
                    AlgebraLookup::Custom(deployer) => {
                        const CALL: &str = "customPoolByPair";
                        with_timeout(
                            CALL,
                            self.timeout,
                            factory.customPoolByPair(deployer, token0, token1).call(),
                        )
                        .await?
                        .map_err(|e| ClmmError::from_contract(CALL, e))?
                    }
                }
            }
        };

        if pool == Address::ZERO {
            return Err(ClmmError::NotFound(format!("pool for {token0}/{token1}")));
        }
        Ok(pool)
    }

    /// Reads the pool's tick spacing, rejecting non-positive values.
    pub async fn tick_spacing(&self, flavor: DexFlavor, pool: Address) -> Result<i32, ClmmError> {
        const CALL: &str = "tickSpacing";
        let spacing = match flavor {
            DexFlavor::UniswapV3 => {
                let pool = IUniswapV3Pool::new(pool, self.provider.clone());
                with_timeout(CALL, self.timeout, pool.tickSpacing().call()).await?
            }
            DexFlavor::AlgebraIntegral => {
                let pool = IAlgebraPool::new(pool, self.provider.clone());
                with_timeout(CALL, self.timeout, pool.tickSpacing().call()).await?
            }
        }
        .map_err(|e| ClmmError::from_contract(CALL, e))?
        .as_i32();

        if spacing <= 0 {
            return Err(ClmmError::Decode {
                call: CALL.to_string(),
                reason: format!("non-positive tick spacing {spacing}"),
            });
        }
        Ok(spacing)
    }

    /// Reads price, tick, active liquidity and global fee growth at `block`.
    pub async fn state(
        &self,
        flavor: DexFlavor,
        pool: Address,
        block: BlockId,
    ) -> Result<PoolStateData, ClmmError> {
        match flavor {
            DexFlavor::UniswapV3 => {
                let pool = IUniswapV3Pool::new(pool, self.provider.clone());
                let slot0 = with_timeout("slot0", self.timeout, pool.slot0().block(block).call())
                    .await?
                    .map_err(|e| ClmmError::from_contract("slot0", e))?;
                let liquidity =
                    with_timeout("liquidity", self.timeout, pool.liquidity().block(block).call())
                        .await?
                        .map_err(|e| ClmmError::from_contract("liquidity", e))?;
                let global0 = with_timeout(
                    "feeGrowthGlobal0X128",
                    self.timeout,
                    pool.feeGrowthGlobal0X128().block(block).call(),
                )
                .await?
                .map_err(|e| ClmmError::from_contract("feeGrowthGlobal0X128", e))?;
                let global1 = with_timeout(
                    "feeGrowthGlobal1X128",
                    self.timeout,
                    pool.feeGrowthGlobal1X128().block(block).call(),
                )
                .await?
                .map_err(|e| ClmmError::from_contract("feeGrowthGlobal1X128", e))?;

                Ok(PoolStateData {
                    sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
                    tick: slot0.tick.as_i32(),
                    liquidity,
                    fee_growth_global0_x128: global0,
                    fee_growth_global1_x128: global1,
                })
            }
            DexFlavor::AlgebraIntegral => {
                let pool = IAlgebraPool::new(pool, self.provider.clone());
                let global_state = with_timeout(
                    "globalState",
                    self.timeout,
                    pool.globalState().block(block).call(),
                )
                .await?
                .map_err(|e| ClmmError::from_contract("globalState", e))?;
                let liquidity =
                    with_timeout("liquidity", self.timeout, pool.liquidity().block(block).call())
                        .await?
                        .map_err(|e| ClmmError::from_contract("liquidity", e))?;
                let global0 = with_timeout(
                    "totalFeeGrowth0Token",
                    self.timeout,
                    pool.totalFeeGrowth0Token().block(block).call(),
                )
                .await?
                .map_err(|e| ClmmError::from_contract("totalFeeGrowth0Token", e))?;
                let global1 = with_timeout(
                    "totalFeeGrowth1Token",
                    self.timeout,
                    pool.totalFeeGrowth1Token().block(block).call(),
                )
                .await?
                .map_err(|e| ClmmError::from_contract("totalFeeGrowth1Token", e))?;

                Ok(PoolStateData {
                    sqrt_price_x96: U256::from(global_state.price),
                    tick: global_state.tick.as_i32(),
                    liquidity,
                    fee_growth_global0_x128: global0,
                    fee_growth_global1_x128: global1,
                })
            }
        }
    }

    /// Reads the outside fee growth of `tick` at `block`.
    pub async fn tick(
        &self,
        flavor: DexFlavor,
        pool: Address,
        tick: i32,
        block: BlockId,
    ) -> Result<TickData, ClmmError> {
        const CALL: &str = "ticks";
        let tick_i24 = I24::try_from(tick).map_err(|_| ClmmError::Decode {
            call: CALL.to_string(),
            reason: format!("tick {tick} exceeds int24"),
        })?;

        match flavor {
            DexFlavor::UniswapV3 => {
                let pool = IUniswapV3Pool::new(pool, self.provider.clone());
                let info = with_timeout(CALL, self.timeout, pool.ticks(tick_i24).block(block).call())
                    .await?
                    .map_err(|e| ClmmError::from_contract(CALL, e))?;
                Ok(TickData {
                    fee_growth_outside0_x128: info.feeGrowthOutside0X128,
                    fee_growth_outside1_x128: info.feeGrowthOutside1X128,
                })
            }
            DexFlavor::AlgebraIntegral => {
                let pool = IAlgebraPool::new(pool, self.provider.clone());
                let info = with_timeout(CALL, self.timeout, pool.ticks(tick_i24).block(block).call())
                    .await?
                    .map_err(|e| ClmmError::from_contract(CALL, e))?;
                Ok(TickData {
                    fee_growth_outside0_x128: info.outerFeeGrowth0Token,
                    fee_growth_outside1_x128: info.outerFeeGrowth1Token,
                })
            }
        }
    }
}
