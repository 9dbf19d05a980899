//! Concentrated-liquidity position monitor.
//!
//! Polls Uniswap V3 and Algebra Integral position managers for the positions of
//! a set of wallets, tracks fees, impermanent loss and a rolling fee APR per
//! position, and notifies when a position leaves or nears the edge of its range
//! or when the portfolio changes.

pub mod apr;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod il;
pub mod monitor;
pub mod notifier;
pub mod portfolio;
pub mod pricing;
pub mod provider;
pub mod reconciler;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod threshold;
pub mod tick_math;
pub mod types;

pub use chain::EvmChainProvider;
pub use config::{ChannelConfig, DexConfig, MonitorConfig, RetrySettings};
pub use error::MonitorError;
pub use events::{EventKind, Notification, NotificationEvent, Severity};
pub use history::{PositionHistory, PositionMetrics};
pub use il::{RebalanceAdvice, RebalanceUrgency};
pub use monitor::{CycleReport, LpMonitor, MonitorContext};
pub use notifier::{Channel, DeliveryReport, NotificationChannel, NotificationDispatcher};
pub use portfolio::{PortfolioSummary, PortfolioUpdate};
pub use provider::ChainDataProvider;
pub use snapshot::{build_snapshot, PositionSnapshot};
pub use store::{HistoryStore, JsonFileStore, MemoryStore};
pub use types::{PoolKey, PoolRef, PoolState, PositionKey, RawPosition, TickFeeGrowth, TokenRef};
