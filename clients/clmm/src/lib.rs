//! Read-only clients for concentrated-liquidity position managers and pools.
//!
//! Two contract families are supported, selected by [`DexFlavor`]:
//! Uniswap V3 style deployments and Algebra Integral style deployments.

mod config;
mod contracts;
mod error;
mod pool;
mod position_manager;
mod token;

pub use config::{DexFlavor, PositionManagerConfig};
pub use error::ClmmError;
pub use pool::{PoolClient, PoolStateData, TickData};
pub use position_manager::{PositionData, PositionManagerClient};
pub use token::{TokenClient, TokenMetadata};
