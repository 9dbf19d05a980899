//! The poll loop.
//!
//! One cycle pins the latest block, enumerates every (DEX, wallet) pair, reads
//! positions, pools and boundary ticks concurrently, and then walks the
//! resulting snapshots one at a time: history update, threshold evaluation,
//! persistence, dispatch. A cycle that opened or closed positions ends with a
//! portfolio update.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::apr::RollingApr;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::events::{EventKind, EventMetrics, Notification, NotificationEvent};
use crate::history::{PositionHistory, PositionMetrics};
use crate::il::{rebalance_recommendation, RebalanceAdvice};
use crate::notifier::{DeliveryReport, NotificationChannel, NotificationDispatcher};
use crate::portfolio::{PortfolioSummary, PortfolioUpdate};
use crate::pricing::{display_symbol, StablecoinSet, TokenPrices, Valuation};
use crate::provider::ChainDataProvider;
use crate::reconciler::{PairScan, Reconciler};
use crate::retry::RetryPolicy;
use crate::snapshot::{build_snapshot, PositionSnapshot};
use crate::store::HistoryStore;
use crate::threshold::{evaluate, Observation, RangeState, ThresholdConfig};
use crate::types::{PoolKey, PoolRef, PoolState, PositionKey, RawPosition, TickFeeGrowth};

/// Configuration plus the settings derived from it, shared read-only.
#[derive(Debug, Clone)]
pub struct MonitorContext {
    pub config: MonitorConfig,
    pub stablecoins: StablecoinSet,
    pub retry: RetryPolicy,
    pub apr: RollingApr,
}

impl MonitorContext {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            stablecoins: StablecoinSet::new(&config.stablecoins),
            retry: config.retry.into(),
            apr: RollingApr::new(config.rolling_window_secs, config.poll_interval_secs),
            config,
        }
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub block_number: u64,
    /// Histories tracked after the cycle
    pub tracked: usize,
    pub opened: usize,
    pub closed: usize,
    /// Histories whose closure waits for a successful scan
    pub deferred: usize,
    /// Positions left out of this cycle after a read or build failure
    pub skipped: usize,
    pub events: Vec<NotificationEvent>,
    pub deliveries: Vec<DeliveryReport>,
    /// Totals over the histories tracked after the cycle
    pub portfolio: PortfolioSummary,
    pub portfolio_update: Option<PortfolioUpdate>,
    /// Shutdown was requested before every position was processed
    pub interrupted: bool,
}

pub struct LpMonitor<P, S, C> {
    context: Arc<MonitorContext>,
    provider: P,
    store: S,
    dispatcher: NotificationDispatcher<C>,
    reconciler: Reconciler,
    /// Pools resolved so far, kept for the process lifetime
    pools: HashMap<PoolKey, PoolRef>,
    /// Near-boundary band of every pool seen, keyed by pool address
    thresholds: HashMap<Address, ThresholdConfig>,
    /// Pairs that completed a scan in a finished cycle. Positions first seen
    /// in a pair that is not primed yet are tracked without announcement.
    primed: HashSet<(String, Address)>,
    /// Histories were restored at startup, every pair announces
    restored: bool,
}

impl<P, S, C> LpMonitor<P, S, C>
where
    P: ChainDataProvider,
    S: HistoryStore,
    C: NotificationChannel,
{
    /// Creates the monitor and restores persisted histories.
    pub fn new(
        context: Arc<MonitorContext>,
        provider: P,
        store: S,
        dispatcher: NotificationDispatcher<C>,
    ) -> Result<Self, MonitorError> {
        let histories = store.load_all()?;
        tracing::info!(positions = histories.len(), "position histories restored");
        Ok(Self {
            context,
            provider,
            store,
            dispatcher,
            restored: !histories.is_empty(),
            primed: HashSet::new(),
            reconciler: Reconciler::from_histories(histories),
            pools: HashMap::new(),
            thresholds: HashMap::new(),
        })
    }

    pub fn context(&self) -> &MonitorContext {
        &self.context
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher<C> {
        &self.dispatcher
    }

    pub fn threshold_config(&self, pool: &Address) -> Option<&ThresholdConfig> {
        self.thresholds.get(pool)
    }

    fn is_primed(&self, dex: &str, wallet: Address) -> bool {
        self.restored || self.primed.contains(&(dex.to_string(), wallet))
    }

    /// Verifies every configured position manager. Any failure is fatal.
    pub async fn startup(&self) -> Result<(), MonitorError> {
        for dex in &self.context.config.dexes {
            self.provider.verify_dex(dex).await?;
        }
        Ok(())
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), MonitorError> {
        self.startup().await?;

        let mut interval = tokio::time::interval(self.context.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.poll_once(&shutdown).await {
                Ok(report) => tracing::info!(
                    block = report.block_number,
                    tracked = report.tracked,
                    opened = report.opened,
                    closed = report.closed,
                    deferred = report.deferred,
                    skipped = report.skipped,
                    events = report.events.len(),
                    value_usd = report.portfolio.total_value_usd,
                    fees_usd = report.portfolio.total_fees_usd,
                    il_usd = report.portfolio.total_il_usd,
                    avg_apr_pct = ?report.portfolio.average_apr_pct,
                    "poll cycle complete"
                ),
                Err(err) => tracing::warn!(kind = err.kind(), error = %err, "poll cycle failed"),
            }
        }

        tracing::info!("monitor stopped");
        Ok(())
    }

    pub async fn poll_once(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<CycleReport, MonitorError> {
        self.poll_at(utils::unix_timestamp_secs(), shutdown).await
    }

    /// Runs one cycle stamped with `now`.
    ///
    /// Only a failure to read the block number fails the cycle; every other
    /// failure skips the affected pair, pool or position.
    pub async fn poll_at(
        &mut self,
        now: u64,
        shutdown: &CancellationToken,
    ) -> Result<CycleReport, MonitorError> {
        let context = Arc::clone(&self.context);
        let config = &context.config;
        let concurrency = config.max_concurrent_requests;
        let retry = context.retry;
        let provider = &self.provider;

        let block = retry
            .run("latest block", || provider.latest_block())
            .await?;
        let mut report = CycleReport {
            block_number: block,
            ..CycleReport::default()
        };

        // Enumerate every pair
        let pairs: Vec<(String, Address)> = config
            .dexes
            .iter()
            .flat_map(|dex| {
                config
                    .wallets_for(dex)
                    .into_iter()
                    .map(move |wallet| (dex.name.clone(), wallet))
            })
            .collect();
        let mut scans: Vec<PairScan> = stream::iter(pairs)
            .map(|(dex, wallet)| async move {
                let ids = retry
                    .run("enumerate positions", || {
                        provider.enumerate_positions(&dex, wallet, block)
                    })
                    .await;
                match ids {
                    Ok(ids) => PairScan::complete(dex, wallet, ids.into_iter().collect()),
                    Err(err) => {
                        tracing::warn!(%dex, %wallet, kind = err.kind(), error = %err, "position enumeration failed");
                        PairScan::failed(dex, wallet)
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        // Read every listed position
        let requests: Vec<(String, Address, U256)> = scans
            .iter()
            .flat_map(|scan| {
                scan.live
                    .iter()
                    .flatten()
                    .map(|id| (scan.dex.clone(), scan.wallet, *id))
            })
            .collect();
        let fetched: Vec<(PositionKey, Result<RawPosition, MonitorError>)> =
            stream::iter(requests)
                .map(|(dex, owner, id)| async move {
                    let result = provider.position(&dex, owner, id, block).await;
                    (PositionKey::new(dex, id), result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut raws: BTreeMap<PositionKey, RawPosition> = BTreeMap::new();
        let mut emptied: HashSet<PositionKey> = HashSet::new();
        for (key, result) in fetched {
            match result {
                Ok(raw) if raw.liquidity == 0 => {
                    emptied.insert(key);
                }
                Ok(raw) => {
                    raws.insert(key, raw);
                }
                Err(err) => {
                    report.skipped += 1;
                    tracing::warn!(position = %key, kind = err.kind(), error = %err, "position read failed");
                }
            }
        }
        // Withdrawn positions count as closed
        for scan in &mut scans {
            let PairScan { dex, live, .. } = scan;
            if let Some(live) = live {
                live.retain(|id| !emptied.contains(&PositionKey::new(dex.as_str(), *id)));
            }
        }

        // Reconciliation and its closures run to completion once started
        if shutdown.is_cancelled() {
            report.interrupted = true;
            return Ok(self.finish(report));
        }

        let outcome = self.reconciler.reconcile(&scans);
        report.deferred = outcome.deferred.len();
        if !outcome.deferred.is_empty() {
            tracing::info!(
                positions = outcome.deferred.len(),
                "closure check deferred, owner scan failed"
            );
        }
        for history in outcome.closed {
            report.closed += 1;
            tracing::info!(position = %history.key, "position closed");
            if let Err(err) = self.store.remove(&history.key) {
                tracing::error!(position = %history.key, error = %err, "failed to remove history");
            }
            let event = closed_event(&history, now);
            let deliveries = self.dispatcher.dispatch(&event.clone().into()).await;
            report.events.push(event);
            report.deliveries.extend(deliveries);
        }

        // Resolve pools not seen before
        let missing: HashSet<PoolKey> = raws
            .values()
            .map(RawPosition::pool_key)
            .filter(|key| !self.pools.contains_key(key))
            .collect();
        let discovered: Vec<(PoolKey, Result<PoolRef, MonitorError>)> = stream::iter(missing)
            .map(|key| async move {
                let result = retry
                    .run("discover pool", || provider.discover_pool(&key))
                    .await;
                (key, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        for (key, result) in discovered {
            match result {
                Ok(mut pool) => {
                    pool.token0.symbol = display_symbol(&pool.token0.symbol, &config.symbol_aliases);
                    pool.token1.symbol = display_symbol(&pool.token1.symbol, &config.symbol_aliases);
                    tracing::info!(
                        dex = %pool.dex,
                        pool = %pool.address,
                        label = %pool.label(),
                        tick_spacing = pool.tick_spacing,
                        "pool discovered"
                    );
                    self.thresholds.insert(
                        pool.address,
                        ThresholdConfig::for_pool(pool.tick_spacing, &config.thresholds),
                    );
                    self.pools.insert(key, pool);
                }
                Err(err) => tracing::warn!(
                    dex = %key.dex,
                    token0 = %key.token0,
                    token1 = %key.token1,
                    kind = err.kind(),
                    error = %err,
                    "pool discovery failed"
                ),
            }
        }

        // Pool state and boundary ticks, pinned to the cycle block
        let pools = &self.pools;
        let active: HashMap<Address, &PoolRef> = raws
            .values()
            .filter_map(|raw| pools.get(&raw.pool_key()))
            .map(|pool| (pool.address, pool))
            .collect();
        let states: HashMap<Address, PoolState> = stream::iter(active.values().copied())
            .map(|pool| async move { (pool, provider.pool_state(pool, block).await) })
            .buffer_unordered(concurrency)
            .filter_map(|(pool, result)| async move {
                match result {
                    Ok(state) => Some((pool.address, state)),
                    Err(err) => {
                        tracing::warn!(pool = %pool.address, kind = err.kind(), error = %err, "pool state read failed");
                        None
                    }
                }
            })
            .collect()
            .await;

        let tick_requests: HashMap<(Address, i32), &PoolRef> = raws
            .values()
            .filter_map(|raw| {
                let pool = pools.get(&raw.pool_key())?;
                states.contains_key(&pool.address).then_some((raw, pool))
            })
            .flat_map(|(raw, pool)| {
                [raw.tick_lower, raw.tick_upper].map(|tick| ((pool.address, tick), pool))
            })
            .collect();
        let ticks: HashMap<(Address, i32), TickFeeGrowth> = stream::iter(tick_requests)
            .map(|((address, tick), pool)| async move {
                (address, tick, provider.tick_fee_growth(pool, tick, block).await)
            })
            .buffer_unordered(concurrency)
            .filter_map(|(address, tick, result)| async move {
                match result {
                    Ok(growth) => Some(((address, tick), growth)),
                    Err(err) => {
                        tracing::warn!(pool = %address, tick, kind = err.kind(), error = %err, "tick read failed");
                        None
                    }
                }
            })
            .collect()
            .await;

        // Snapshots
        let mut snapshots: Vec<PositionSnapshot> = Vec::with_capacity(raws.len());
        for (key, raw) in &raws {
            let inputs = pools.get(&raw.pool_key()).and_then(|pool| {
                let state = states.get(&pool.address)?;
                let lower = ticks.get(&(pool.address, raw.tick_lower))?;
                let upper = ticks.get(&(pool.address, raw.tick_upper))?;
                Some((pool, state, lower, upper))
            });
            let Some((pool, state, lower, upper)) = inputs else {
                report.skipped += 1;
                continue;
            };
            match build_snapshot(raw, pool, state, lower, upper, now) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err @ MonitorError::StaleData { .. }) => {
                    report.skipped += 1;
                    tracing::info!(position = %key, error = %err, "stale pool data, retrying next poll");
                }
                Err(err) => {
                    report.skipped += 1;
                    tracing::warn!(position = %key, kind = err.kind(), error = %err, "snapshot skipped");
                }
            }
        }

        let prices = TokenPrices::derive(
            snapshots.iter().map(|snapshot| (&snapshot.pool, snapshot.price)),
            &context.stablecoins,
        );

        // One position at a time from here on
        for snapshot in snapshots {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                return Ok(self.finish(report));
            }

            let valuation = prices.valuation(&snapshot.pool, snapshot.price);
            let thresholds = *self
                .thresholds
                .entry(snapshot.pool.address)
                .or_insert_with(|| {
                    ThresholdConfig::for_pool(snapshot.pool.tick_spacing, &config.thresholds)
                });
            let range_state = thresholds.classify(&snapshot);
            let announce = self.is_primed(&snapshot.key.dex, snapshot.owner);

            let (history, created) = self.reconciler.admit(&snapshot, &valuation);
            let metrics = history.update(snapshot.clone(), &valuation, &context.apr);

            let mut kinds = Vec::new();
            if created {
                report.opened += 1;
                if announce {
                    kinds.push(EventKind::PositionOpened);
                }
            }
            kinds.extend(evaluate(
                &mut history.notification,
                &Observation {
                    state: range_state,
                    fees_value: metrics.unclaimed_fees_value,
                    il_pct: metrics.il.il_pct,
                    timestamp: now,
                },
                &config.milestones,
                &config.reminders,
            ));

            if let Err(err) = self.store.save(history) {
                tracing::error!(position = %snapshot.key, error = %err, "failed to persist history");
            }
            let advice = rebalance_recommendation(&snapshot, &metrics.il, &config.rebalance);
            log_position(&snapshot, range_state, &metrics, &advice);

            let event_metrics = event_metrics(&metrics);
            for kind in kinds {
                let event =
                    NotificationEvent::new(kind, &snapshot, range_state, event_metrics, &valuation, now)
                        .with_advice(advice.clone());
                tracing::info!(position = %event.key, title = %event.title(), "notifying");
                let deliveries = self.dispatcher.dispatch(&event.clone().into()).await;
                report.events.push(event);
                report.deliveries.extend(deliveries);
            }
        }

        for scan in &scans {
            if scan.live.is_some() {
                self.primed.insert((scan.dex.clone(), scan.wallet));
            }
        }

        let announced = report
            .events
            .iter()
            .filter(|event| event.kind == EventKind::PositionOpened)
            .count();
        let mut report = self.finish(report);
        if announced > 0 || report.closed > 0 {
            let update = PortfolioUpdate {
                opened: announced,
                closed: report.closed,
                summary: report.portfolio,
                timestamp: now,
            };
            tracing::info!(opened = update.opened, closed = update.closed, "notifying portfolio update");
            let deliveries = self
                .dispatcher
                .dispatch(&Notification::from(update.clone()))
                .await;
            report.deliveries.extend(deliveries);
            report.portfolio_update = Some(update);
        }
        Ok(report)
    }

    fn finish(&self, mut report: CycleReport) -> CycleReport {
        report.tracked = self.reconciler.len();
        report.portfolio = PortfolioSummary::from_histories(self.reconciler.histories());
        report
    }
}

fn event_metrics(metrics: &PositionMetrics) -> EventMetrics {
    EventMetrics {
        fees_value: metrics.unclaimed_fees_value,
        il_pct: Some(metrics.il.il_pct),
        apr_pct: metrics.apr.apr_pct,
    }
}

fn closed_event(history: &PositionHistory, now: u64) -> NotificationEvent {
    let (valuation, metrics) = match &history.last_metrics {
        Some(metrics) => (metrics.valuation, event_metrics(metrics)),
        None => (
            Valuation::in_token1(history.latest.price),
            EventMetrics::default(),
        ),
    };
    NotificationEvent::new(
        EventKind::PositionClosed,
        &history.latest,
        history
            .notification
            .last_range_state
            .unwrap_or(RangeState::InRange),
        metrics,
        &valuation,
        now,
    )
}

fn log_position(
    snapshot: &PositionSnapshot,
    range_state: RangeState,
    metrics: &PositionMetrics,
    advice: &RebalanceAdvice,
) {
    tracing::info!(
        position = %snapshot.key,
        pool = %snapshot.pool.label(),
        state = ?range_state,
        price = snapshot.price,
        lower = snapshot.lower_price,
        upper = snapshot.upper_price,
        amount0 = snapshot.amount0,
        amount1 = snapshot.amount1,
        value = metrics.composition_value,
        fees = metrics.unclaimed_fees_value,
        il_pct = metrics.il.il_pct,
        apr_pct = ?metrics.apr.apr_pct,
        apr_warming_up = metrics.apr.warming_up,
        unit = ?metrics.valuation.unit,
        efficiency = advice.efficiency,
        rebalance = advice.should_rebalance,
        urgency = ?advice.urgency,
        "position"
    );
}
