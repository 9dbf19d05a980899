//! Configuration of the LP monitor, loaded from a JSON file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use clients_clmm::{DexFlavor, PositionManagerConfig};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MonitorError;
use crate::il::RebalanceSettings;
use crate::pricing::{default_symbol_aliases, DEFAULT_STABLECOINS};
use crate::threshold::{MilestoneSettings, ReminderSettings, ThresholdSettings};

/// One DEX deployment to monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexConfig {
    /// Display name, also the first half of every position key
    pub name: String,
    #[serde(default)]
    pub flavor: DexFlavor,
    /// NonfungiblePositionManager contract address
    pub position_manager: Address,
    /// Wallets for this DEX only; the global list applies when empty
    #[serde(default)]
    pub wallets: Vec<Address>,
}

impl DexConfig {
    pub fn manager_config(&self) -> PositionManagerConfig {
        PositionManagerConfig {
            address: self.position_manager,
            flavor: self.flavor,
        }
    }
}

/// Backoff for cycle-level reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Delay before the second attempt, doubled for every further one
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// Notification channel credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Telegram { bot_token: String, chat_id: String },
    Discord { webhook_url: String },
    Pushover { api_token: String, user_key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// JSON-RPC endpoint of the chain
    pub rpc_url: String,
    /// Wallets monitored on every DEX without its own list
    #[serde(default)]
    pub wallets: Vec<Address>,
    pub dexes: Vec<DexConfig>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Look-back of the fee APR
    #[serde(default = "default_rolling_window_secs")]
    pub rolling_window_secs: u64,
    /// Per RPC call and per notification send
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub thresholds: ThresholdSettings,
    #[serde(default)]
    pub milestones: MilestoneSettings,
    #[serde(default)]
    pub reminders: ReminderSettings,
    #[serde(default)]
    pub rebalance: RebalanceSettings,
    #[serde(default)]
    pub notifications: Vec<ChannelConfig>,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Symbols valued at 1 USD
    #[serde(default = "default_stablecoins")]
    pub stablecoins: Vec<String>,
    /// On-chain symbol to display symbol, e.g. `WHYPE` to `HYPE`
    #[serde(default = "default_symbol_aliases")]
    pub symbol_aliases: BTreeMap<String, String>,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_rolling_window_secs() -> u64 {
    86_400
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_requests() -> usize {
    8
}

fn default_state_path() -> PathBuf {
    PathBuf::from("lp_monitor_state.json")
}

fn default_stablecoins() -> Vec<String> {
    DEFAULT_STABLECOINS.iter().map(|s| s.to_string()).collect()
}

impl MonitorConfig {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MonitorError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        let fail = |msg: String| Err(MonitorError::Configuration(msg));

        self.rpc_url()?;
        if self.dexes.is_empty() {
            return fail("at least one dex is required".to_string());
        }
        let mut names = HashSet::new();
        for dex in &self.dexes {
            if dex.name.trim().is_empty() {
                return fail("dex name must not be empty".to_string());
            }
            if !names.insert(dex.name.as_str()) {
                return fail(format!("duplicate dex name {}", dex.name));
            }
            if dex.position_manager == Address::ZERO {
                return fail(format!("{}: position manager address is zero", dex.name));
            }
            if self.wallets_for(dex).is_empty() {
                return fail(format!("{}: no wallet to monitor", dex.name));
            }
        }

        if self.poll_interval_secs == 0 {
            return fail("poll_interval_secs must be positive".to_string());
        }
        if self.rolling_window_secs < self.poll_interval_secs {
            return fail(format!(
                "rolling_window_secs {} is shorter than poll_interval_secs {}",
                self.rolling_window_secs, self.poll_interval_secs
            ));
        }
        if self.request_timeout_secs == 0 {
            return fail("request_timeout_secs must be positive".to_string());
        }
        if self.max_concurrent_requests == 0 {
            return fail("max_concurrent_requests must be positive".to_string());
        }
        if self.retry.attempts == 0 {
            return fail("retry.attempts must be positive".to_string());
        }

        let thresholds = &self.thresholds;
        if thresholds.near_boundary_spacings == 0 || thresholds.min_band_ticks == 0 {
            return fail("threshold band settings must be positive".to_string());
        }
        if !(thresholds.max_range_fraction > 0.0 && thresholds.max_range_fraction <= 0.5) {
            return fail(format!(
                "max_range_fraction {} outside (0, 0.5]",
                thresholds.max_range_fraction
            ));
        }

        check_levels("milestones.fee_value", &self.milestones.fee_value)?;
        check_levels("milestones.il_loss_pct", &self.milestones.il_loss_pct)?;
        let rebalance = &self.rebalance;
        let bounds = [
            rebalance.il_warning_pct,
            rebalance.il_critical_pct,
            rebalance.edge_danger_pct,
            rebalance.center_deviation_pct,
        ];
        if bounds.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return fail("rebalance thresholds must be positive".to_string());
        }
        if rebalance.il_warning_pct >= rebalance.il_critical_pct {
            return fail("rebalance.il_warning_pct must be below il_critical_pct".to_string());
        }
        let rearm = self.milestones.rearm_fraction;
        if !(0.0..1.0).contains(&rearm) {
            return fail(format!("milestones.rearm_fraction {rearm} outside [0, 1)"));
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> Result<Url, MonitorError> {
        self.rpc_url
            .parse()
            .map_err(|e| MonitorError::Configuration(format!("invalid rpc_url {}: {e}", self.rpc_url)))
    }

    /// Wallets monitored on `dex`, without duplicates.
    pub fn wallets_for(&self, dex: &DexConfig) -> Vec<Address> {
        let source = if dex.wallets.is_empty() {
            &self.wallets
        } else {
            &dex.wallets
        };
        let mut seen = HashSet::new();
        source.iter().copied().filter(|w| seen.insert(*w)).collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn check_levels(name: &str, levels: &[f64]) -> Result<(), MonitorError> {
    if levels.iter().any(|level| !(level.is_finite() && *level > 0.0)) {
        return Err(MonitorError::Configuration(format!(
            "{name} levels must be positive"
        )));
    }
    if levels.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(MonitorError::Configuration(format!(
            "{name} levels must be strictly ascending"
        )));
    }
    Ok(())
}
