//! [`ChainDataProvider`] backed by JSON-RPC through `clients-clmm`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use alloy::eips::BlockId;
use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, RootProvider};
use clients_clmm::{PoolClient, PositionManagerClient, TokenClient};
use url::Url;

use crate::config::DexConfig;
use crate::error::MonitorError;
use crate::provider::ChainDataProvider;
use crate::types::{PoolKey, PoolRef, PoolState, RawPosition, TickFeeGrowth, TokenRef};

pub struct EvmChainProvider {
    managers: HashMap<String, PositionManagerClient>,
    pools: PoolClient,
    tokens: TokenClient,
    /// Factory of every verified DEX
    factories: RwLock<HashMap<String, Address>>,
}

impl EvmChainProvider {
    /// Creates a provider for `dexes` on top of an existing alloy provider.
    pub fn new(provider: DynProvider, dexes: &[DexConfig], timeout: Duration) -> Self {
        let managers = dexes
            .iter()
            .map(|dex| {
                let client =
                    PositionManagerClient::new(dex.manager_config(), provider.clone(), timeout);
                (dex.name.clone(), client)
            })
            .collect();
        Self {
            pools: PoolClient::new(provider.clone(), timeout),
            tokens: TokenClient::new(provider, timeout),
            managers,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Connects over HTTP to `rpc_url`.
    pub fn connect_http(rpc_url: Url, dexes: &[DexConfig], timeout: Duration) -> Self {
        let provider = RootProvider::<Ethereum>::new_http(rpc_url).erased();
        Self::new(provider, dexes, timeout)
    }

    fn manager(&self, dex: &str) -> Result<&PositionManagerClient, MonitorError> {
        self.managers
            .get(dex)
            .ok_or_else(|| MonitorError::Configuration(format!("unknown dex {dex}")))
    }

    fn cached_factory(&self, dex: &str) -> Option<Address> {
        self.factories
            .read()
            .ok()
            .and_then(|factories| factories.get(dex).copied())
    }

    async fn factory(&self, dex: &str) -> Result<Address, MonitorError> {
        if let Some(factory) = self.cached_factory(dex) {
            return Ok(factory);
        }
        let factory = self.manager(dex)?.factory().await?;
        if let Ok(mut factories) = self.factories.write() {
            factories.insert(dex.to_string(), factory);
        }
        Ok(factory)
    }

    async fn token(&self, address: Address) -> Result<TokenRef, MonitorError> {
        let metadata = self.tokens.metadata(address).await?;
        Ok(TokenRef {
            address: metadata.address,
            symbol: metadata.symbol,
            decimals: metadata.decimals,
        })
    }
}

impl ChainDataProvider for EvmChainProvider {
    async fn latest_block(&self) -> Result<u64, MonitorError> {
        let manager = self.managers.values().next().ok_or_else(|| {
            MonitorError::Configuration("no position manager configured".to_string())
        })?;
        Ok(manager.get_block_number().await?)
    }

    async fn verify_dex(&self, dex: &DexConfig) -> Result<(), MonitorError> {
        let manager = self.manager(&dex.name)?;
        let factory = manager.factory().await.map_err(|e| {
            MonitorError::Configuration(format!(
                "{} position manager {} unreachable: {e}",
                dex.name, dex.position_manager
            ))
        })?;
        tracing::info!(dex = %dex.name, flavor = %manager.flavor(), %factory, "position manager verified");
        if let Ok(mut factories) = self.factories.write() {
            factories.insert(dex.name.clone(), factory);
        }
        Ok(())
    }

    async fn enumerate_positions(
        &self,
        dex: &str,
        wallet: Address,
        block: u64,
    ) -> Result<Vec<U256>, MonitorError> {
        let ids = self
            .manager(dex)?
            .position_ids(wallet, BlockId::number(block))
            .await?;
        Ok(ids)
    }

    async fn position(
        &self,
        dex: &str,
        owner: Address,
        token_id: U256,
        block: u64,
    ) -> Result<RawPosition, MonitorError> {
        let data = self
            .manager(dex)?
            .position(token_id, BlockId::number(block))
            .await?;
        Ok(RawPosition::from_client(dex, owner, data))
    }

    async fn discover_pool(&self, key: &PoolKey) -> Result<PoolRef, MonitorError> {
        let flavor = self.manager(&key.dex)?.flavor();
        let factory = self.factory(&key.dex).await?;
        let address = self
            .pools
            .pool_address(flavor, factory, key.token0, key.token1, key.fee, key.deployer)
            .await?;

        let (tick_spacing, token0, token1) = tokio::try_join!(
            async {
                self.pools
                    .tick_spacing(flavor, address)
                    .await
                    .map_err(MonitorError::from)
            },
            self.token(key.token0),
            self.token(key.token1),
        )?;

        Ok(PoolRef {
            dex: key.dex.clone(),
            flavor,
            address,
            token0,
            token1,
            tick_spacing,
            fee_tier: key.fee,
        })
    }

    async fn pool_state(&self, pool: &PoolRef, block: u64) -> Result<PoolState, MonitorError> {
        let data = self
            .pools
            .state(pool.flavor, pool.address, BlockId::number(block))
            .await?;
        Ok(PoolState::from_client(data, block))
    }

    async fn tick_fee_growth(
        &self,
        pool: &PoolRef,
        tick: i32,
        block: u64,
    ) -> Result<TickFeeGrowth, MonitorError> {
        let data = self
            .pools
            .tick(pool.flavor, pool.address, tick, BlockId::number(block))
            .await?;
        Ok(data.into())
    }
}
