//! Position manager client and raw position data.

use std::time::Duration;

use alloy::eips::BlockId;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider};

use crate::config::{DexFlavor, PositionManagerConfig};
use crate::contracts::{IAlgebraPositionManager, INonfungiblePositionManager};
use crate::error::{with_timeout, ClmmError};

/// Position data as stored by the position manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionData {
    /// The position NFT token ID
    pub token_id: U256,
    /// Address of token0 in the pair
    pub token0: Address,
    /// Address of token1 in the pair
    pub token1: Address,
    /// Fee tier in hundredths of a bip, absent for Algebra pools
    pub fee: Option<u32>,
    /// Custom pool deployer of an Algebra position, zero for the default deployer
    pub deployer: Option<Address>,
    /// Lower tick boundary of the position
    pub tick_lower: i32,
    /// Upper tick boundary of the position
    pub tick_upper: i32,
    /// Current liquidity amount in the position
    pub liquidity: u128,
    /// Fee growth inside the range for token0 as of the last position update
    pub fee_growth_inside0_last_x128: U256,
    /// Fee growth inside the range for token1 as of the last position update
    pub fee_growth_inside1_last_x128: U256,
    /// Token0 owed to the position and not yet collected
    pub tokens_owed0: u128,
    /// Token1 owed to the position and not yet collected
    pub tokens_owed1: u128,
}

enum ManagerInstance {
    UniswapV3(INonfungiblePositionManager::INonfungiblePositionManagerInstance<DynProvider>),
    Algebra(IAlgebraPositionManager::IAlgebraPositionManagerInstance<DynProvider>),
}

/// Reads position NFTs from a Uniswap V3 or Algebra Integral position manager
pub struct PositionManagerClient {
    /// Contract family of the deployment
    flavor: DexFlavor,
    /// Flavor-specific contract instance
    instance: ManagerInstance,
    /// Provider shared with the contract instance
    provider: DynProvider,
    /// Deadline applied to every RPC call
    timeout: Duration,
}

impl PositionManagerClient {
    /// Creates a new `PositionManagerClient`
    ///
    /// # Arguments
    /// * `config` - Contract address and flavor of the position manager
    /// * `provider` - Provider used for every read
    /// * `timeout` - Deadline applied to each RPC call
    pub fn new(config: PositionManagerConfig, provider: DynProvider, timeout: Duration) -> Self {
        let instance = match config.flavor {
            DexFlavor::UniswapV3 => ManagerInstance::UniswapV3(INonfungiblePositionManager::new(
                config.address,
                provider.clone(),
            )),
            DexFlavor::AlgebraIntegral => ManagerInstance::Algebra(IAlgebraPositionManager::new(
                config.address,
                provider.clone(),
            )),
        };
        Self {
            flavor: config.flavor,
            instance,
            provider,
            timeout,
        }
    }

    /// Contract family of this position manager.
    pub fn flavor(&self) -> DexFlavor {
        self.flavor
    }

    /// Gets the current block number from the blockchain provider
    pub async fn get_block_number(&self) -> Result<u64, ClmmError> {
        const CALL: &str = "eth_blockNumber";
        with_timeout(CALL, self.timeout, self.provider.get_block_number())
            .await?
            .map_err(|e| ClmmError::from_transport(CALL, e))
    }

    /// Reads the factory the position manager deploys pools through.
    ///
    /// Used at startup to prove the configured address is a reachable position manager.
    pub async fn factory(&self) -> Result<Address, ClmmError> {
        const CALL: &str = "factory";
        let factory = match &self.instance {
            ManagerInstance::UniswapV3(manager) => {
                with_timeout(CALL, self.timeout, manager.factory().call()).await?
            }
            ManagerInstance::Algebra(manager) => {
                with_timeout(CALL, self.timeout, manager.factory().call()).await?
            }
        }
        .map_err(|e| ClmmError::from_contract(CALL, e))?;

        if factory == Address::ZERO {
            return Err(ClmmError::NotFound("factory".to_string()));
        }
        Ok(factory)
    }

    /// Enumerates every position token ID held by `owner` at `block`
    ///
    /// # Arguments
    /// * `owner` - Wallet holding the position NFTs
    /// * `block` - Block the enumeration is pinned to
    ///
    /// # Returns
    /// The token IDs in enumeration order, or the first error encountered
    pub async fn position_ids(&self, owner: Address, block: BlockId) -> Result<Vec<U256>, ClmmError> {
        let balance = self.balance_of(owner, block).await?;
        let count = u64::try_from(balance).map_err(|_| ClmmError::Decode {
            call: "balanceOf".to_string(),
            reason: format!("balance {balance} does not fit in u64"),
        })?;

        let mut token_ids = Vec::with_capacity(count as usize);
        for index in 0..count {
            token_ids.push(self.token_of_owner_by_index(owner, index, block).await?);
        }
        Ok(token_ids)
    }

    async fn balance_of(&self, owner: Address, block: BlockId) -> Result<U256, ClmmError> {
        const CALL: &str = "balanceOf";
        match &self.instance {
            ManagerInstance::UniswapV3(manager) => {
                with_timeout(CALL, self.timeout, manager.balanceOf(owner).block(block).call())
                    .await?
            }
            ManagerInstance::Algebra(manager) => {
                with_timeout(CALL, self.timeout, manager.balanceOf(owner).block(block).call())
                    .await?
            }
        }
        .map_err(|e| ClmmError::from_contract(CALL, e))
    }

    async fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: u64,
        block: BlockId,
    ) -> Result<U256, ClmmError> {
        const CALL: &str = "tokenOfOwnerByIndex";
        let index = U256::from(index);
        match &self.instance {
            ManagerInstance::UniswapV3(manager) => {
                with_timeout(
                    CALL,
                    self.timeout,
                    manager.tokenOfOwnerByIndex(owner, index).block(block).call(),
                )
                .await?
            }
            ManagerInstance::Algebra(manager) => {
                with_timeout(
                    CALL,
                    self.timeout,
                    manager.tokenOfOwnerByIndex(owner, index).block(block).call(),
                )
                .await?
            }
        }
        .map_err(|e| ClmmError::from_contract(CALL, e))
    }

    /// Reads the stored state of one position at `block`.
    pub async fn position(&self, token_id: U256, block: BlockId) -> Result<PositionData, ClmmError> {
        const CALL: &str = "positions";
        let data = match &self.instance {
            ManagerInstance::UniswapV3(manager) => {
                let info = with_timeout(CALL, self.timeout, manager.positions(token_id).block(block).call())
                    .await?
                    .map_err(|e| ClmmError::from_contract(CALL, e))?;
                PositionData {
                    token_id,
                    token0: info.token0,
                    token1: info.token1,
                    fee: Some(info.fee.to::<u32>()),
                    deployer: None,
                    tick_lower: info.tickLower.as_i32(),
                    tick_upper: info.tickUpper.as_i32(),
                    liquidity: info.liquidity,
                    fee_growth_inside0_last_x128: info.feeGrowthInside0LastX128,
                    fee_growth_inside1_last_x128: info.feeGrowthInside1LastX128,
                    tokens_owed0: info.tokensOwed0,
                    tokens_owed1: info.tokensOwed1,
                }
            }
            ManagerInstance::Algebra(manager) => {
                let info = with_timeout(CALL, self.timeout, manager.positions(token_id).block(block).call())
                    .await?
                    .map_err(|e| ClmmError::from_contract(CALL, e))?;
                PositionData {
                    token_id,
                    token0: info.token0,
                    token1: info.token1,
                    fee: None,
                    deployer: Some(info.deployer),
                    tick_lower: info.tickLower.as_i32(),
                    tick_upper: info.tickUpper.as_i32(),
                    liquidity: info.liquidity,
                    fee_growth_inside0_last_x128: info.feeGrowthInside0LastX128,
                    fee_growth_inside1_last_x128: info.feeGrowthInside1LastX128,
                    tokens_owed0: info.tokensOwed0,
                    tokens_owed1: info.tokensOwed1,
                }
            }
        };

        if data.token0 == Address::ZERO || data.token1 == Address::ZERO {
            return Err(ClmmError::Decode {
                call: CALL.to_string(),
                reason: format!("position {token_id} has a zero token address"),
            });
        }
        Ok(data)
    }
}
