//! Chain data capability consumed by the monitor.

use std::future::Future;

use alloy::primitives::{Address, U256};

use crate::config::DexConfig;
use crate::error::MonitorError;
use crate::types::{PoolKey, PoolRef, PoolState, RawPosition, TickFeeGrowth};

/// Read-only access to position managers and pools.
///
/// Every block-pinned read takes the block number chosen at the start of the
/// poll cycle. Transport failures surface as [`MonitorError::Network`], decode
/// failures and reverts as [`MonitorError::MalformedData`].
pub trait ChainDataProvider: Send + Sync {
    fn latest_block(&self) -> impl Future<Output = Result<u64, MonitorError>> + Send;

    /// Proves `dex` points at a reachable position manager.
    fn verify_dex(&self, dex: &DexConfig) -> impl Future<Output = Result<(), MonitorError>> + Send;

    /// Position NFT ids held by `wallet` on `dex`.
    fn enumerate_positions(
        &self,
        dex: &str,
        wallet: Address,
        block: u64,
    ) -> impl Future<Output = Result<Vec<U256>, MonitorError>> + Send;

    fn position(
        &self,
        dex: &str,
        owner: Address,
        token_id: U256,
        block: u64,
    ) -> impl Future<Output = Result<RawPosition, MonitorError>> + Send;

    /// Resolves the pool of `key` with its tick spacing and token metadata.
    /// Token symbols are returned as reported on chain.
    fn discover_pool(
        &self,
        key: &PoolKey,
    ) -> impl Future<Output = Result<PoolRef, MonitorError>> + Send;

    fn pool_state(
        &self,
        pool: &PoolRef,
        block: u64,
    ) -> impl Future<Output = Result<PoolState, MonitorError>> + Send;

    fn tick_fee_growth(
        &self,
        pool: &PoolRef,
        tick: i32,
        block: u64,
    ) -> impl Future<Output = Result<TickFeeGrowth, MonitorError>> + Send;
}
