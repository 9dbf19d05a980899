//! LP monitor: polls every configured position manager and notifies on range changes.
//!
//! Usage: lp-monitor [config_path]
//!
//! The config path defaults to `lp_monitor_config.json`. Log verbosity follows
//! `RUST_LOG` and defaults to `info`.

use std::sync::Arc;

use anyhow::Result;
use lpmonitor::{
    Channel, EvmChainProvider, JsonFileStore, LpMonitor, MonitorConfig, MonitorContext,
    NotificationDispatcher,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "lp_monitor_config.json";

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(|s| s.trim()).unwrap_or(DEFAULT_CONFIG_PATH);
    let config = MonitorConfig::load(config_path)?;
    tracing::info!(
        config = config_path,
        dexes = config.dexes.len(),
        wallets = config.wallets.len(),
        channels = config.notifications.len(),
        "configuration loaded"
    );

    let timeout = config.request_timeout();
    let provider = EvmChainProvider::connect_http(config.rpc_url()?, &config.dexes, timeout);
    let store = JsonFileStore::open(&config.state_path)?;
    let channels = config
        .notifications
        .iter()
        .map(|channel| Channel::from_config(channel, timeout))
        .collect::<Result<Vec<_>, _>>()?;
    let dispatcher = NotificationDispatcher::new(channels, timeout);

    let context = Arc::new(MonitorContext::new(config));
    let mut monitor = LpMonitor::new(context, provider, store, dispatcher)?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            trigger.cancel();
        }
    });

    monitor.run(shutdown).await?;
    Ok(())
}
