use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use clients_clmm::DexFlavor;
use lpmonitor::{
    ChainDataProvider, DexConfig, EventKind, HistoryStore, JsonFileStore, LpMonitor, MemoryStore,
    MonitorConfig, MonitorContext, MonitorError, Notification, NotificationChannel,
    NotificationDispatcher, NotificationEvent, PoolKey, PoolRef, PoolState, PortfolioUpdate,
    PositionKey, RawPosition, RebalanceUrgency, TickFeeGrowth, TokenRef,
};
use lpmonitor::il::RebalanceReason;
use lpmonitor::threshold::ThresholdConfig;
use tokio_util::sync::CancellationToken;

const DEX: &str = "TestSwap";
const POSITION_LIQUIDITY: u128 = 1_000_000_000_000_000_000;

fn wallet_a() -> Address {
    Address::repeat_byte(0x11)
}

fn wallet_b() -> Address {
    Address::repeat_byte(0x22)
}

fn token0() -> Address {
    Address::repeat_byte(0x01)
}

fn token1() -> Address {
    Address::repeat_byte(0x02)
}

fn sqrt_price_at(tick: i32) -> U256 {
    let sqrt = 1.0001_f64.powf(f64::from(tick) / 2.0) * 2_f64.powi(96);
    U256::from(sqrt as u128)
}

struct ChainState {
    block: u64,
    owned: HashMap<Address, Vec<u64>>,
    liquidity: HashMap<u64, u128>,
    tick: i32,
    failing_wallets: HashSet<Address>,
    discover_calls: usize,
}

#[derive(Clone)]
struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                block: 1_000,
                owned: HashMap::new(),
                liquidity: HashMap::new(),
                tick: 0,
                failing_wallets: HashSet::new(),
                discover_calls: 0,
            })),
        }
    }

    fn set_owned(&self, wallet: Address, ids: &[u64]) {
        let mut state = self.state.lock().unwrap();
        for id in ids {
            state.liquidity.entry(*id).or_insert(POSITION_LIQUIDITY);
        }
        state.owned.insert(wallet, ids.to_vec());
    }

    fn set_liquidity(&self, id: u64, liquidity: u128) {
        self.state.lock().unwrap().liquidity.insert(id, liquidity);
    }

    fn set_tick(&self, tick: i32) {
        let mut state = self.state.lock().unwrap();
        state.tick = tick;
        state.block += 1;
    }

    fn fail_wallet(&self, wallet: Address, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_wallets.insert(wallet);
        } else {
            state.failing_wallets.remove(&wallet);
        }
    }

    fn discover_calls(&self) -> usize {
        self.state.lock().unwrap().discover_calls
    }

    fn pool() -> PoolRef {
        let token = |address: Address, symbol: &str| TokenRef {
            address,
            symbol: symbol.to_string(),
            decimals: 18,
        };
        PoolRef {
            dex: DEX.to_string(),
            flavor: DexFlavor::UniswapV3,
            address: Address::repeat_byte(0xaa),
            token0: token(token0(), "WHYPE"),
            token1: token(token1(), "USDC"),
            tick_spacing: 10,
            fee_tier: Some(3000),
        }
    }
}

impl ChainDataProvider for FakeChain {
    async fn latest_block(&self) -> Result<u64, MonitorError> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn verify_dex(&self, _dex: &DexConfig) -> Result<(), MonitorError> {
        Ok(())
    }

    async fn enumerate_positions(
        &self,
        _dex: &str,
        wallet: Address,
        _block: u64,
    ) -> Result<Vec<U256>, MonitorError> {
        let state = self.state.lock().unwrap();
        if state.failing_wallets.contains(&wallet) {
            return Err(MonitorError::Network("connection reset".to_string()));
        }
        Ok(state
            .owned
            .get(&wallet)
            .map(|ids| ids.iter().map(|id| U256::from(*id)).collect())
            .unwrap_or_default())
    }

    async fn position(
        &self,
        dex: &str,
        owner: Address,
        token_id: U256,
        _block: u64,
    ) -> Result<RawPosition, MonitorError> {
        let state = self.state.lock().unwrap();
        let id = token_id.to::<u64>();
        let liquidity = state
            .liquidity
            .get(&id)
            .copied()
            .ok_or_else(|| MonitorError::MalformedData(format!("unknown position {id}")))?;
        Ok(RawPosition {
            key: PositionKey::new(dex, token_id),
            owner,
            token0: token0(),
            token1: token1(),
            fee: Some(3000),
            deployer: None,
            tick_lower: -600,
            tick_upper: 600,
            liquidity,
            fee_growth_inside0_last_x128: U256::ZERO,
            fee_growth_inside1_last_x128: U256::ZERO,
            tokens_owed0: 0,
            tokens_owed1: 0,
        })
    }

    async fn discover_pool(&self, key: &PoolKey) -> Result<PoolRef, MonitorError> {
        self.state.lock().unwrap().discover_calls += 1;
        assert_eq!(key.dex, DEX);
        Ok(FakeChain::pool())
    }

    async fn pool_state(&self, _pool: &PoolRef, block: u64) -> Result<PoolState, MonitorError> {
        let state = self.state.lock().unwrap();
        Ok(PoolState {
            tick: state.tick,
            sqrt_price_x96: sqrt_price_at(state.tick),
            liquidity: u128::MAX / 2,
            fee_growth_global0_x128: U256::ZERO,
            fee_growth_global1_x128: U256::ZERO,
            block_number: block,
        })
    }

    async fn tick_fee_growth(
        &self,
        _pool: &PoolRef,
        _tick: i32,
        _block: u64,
    ) -> Result<TickFeeGrowth, MonitorError> {
        Ok(TickFeeGrowth::default())
    }
}

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<NotificationEvent>>>,
    portfolio: Arc<Mutex<Vec<PortfolioUpdate>>>,
}

impl Recorder {
    fn kinds(&self) -> Vec<(u64, EventKind)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|event| (event.key.token_id.to::<u64>(), event.kind.clone()))
            .collect()
    }

    fn portfolio_updates(&self) -> Vec<PortfolioUpdate> {
        self.portfolio.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.portfolio.lock().unwrap().clear();
    }
}

impl NotificationChannel for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        match notification {
            Notification::Position(event) => self.sent.lock().unwrap().push(event.clone()),
            Notification::Portfolio(update) => self.portfolio.lock().unwrap().push(update.clone()),
        }
        Ok(())
    }
}

fn config() -> MonitorConfig {
    let json = serde_json::json!({
        "rpc_url": "http://localhost:8545",
        "wallets": [wallet_a(), wallet_b()],
        "dexes": [{"name": DEX, "flavor": "uniswap_v3", "position_manager": Address::repeat_byte(0x99)}],
        "poll_interval_secs": 30,
        "retry": {"attempts": 2, "base_delay_ms": 1},
        "milestones": {"fee_value": [1.0], "il_loss_pct": [50.0]}
    });
    MonitorConfig::from_json(&json.to_string()).unwrap()
}

type TestMonitor<S> = LpMonitor<FakeChain, S, Recorder>;

fn monitor_with<S: HistoryStore>(chain: &FakeChain, store: S) -> (TestMonitor<S>, Recorder) {
    let recorder = Recorder::default();
    let dispatcher = NotificationDispatcher::new(vec![recorder.clone()], Duration::from_secs(1));
    let context = Arc::new(MonitorContext::new(config()));
    let monitor = LpMonitor::new(context, chain.clone(), store, dispatcher).unwrap();
    (monitor, recorder)
}

fn key(id: u64) -> PositionKey {
    PositionKey::new(DEX, U256::from(id))
}

#[tokio::test]
async fn test_first_cycle_tracks_silently() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1, 2]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    let report = monitor.poll_at(1_000, &shutdown).await.unwrap();
    assert_eq!(report.block_number, 1_000);
    assert_eq!(report.opened, 2);
    assert_eq!(report.tracked, 2);
    assert_eq!(report.skipped, 0);
    assert!(report.events.is_empty());
    assert!(recorder.kinds().is_empty());
    assert_eq!(monitor.store().load_all().unwrap().len(), 2);

    let history = monitor.reconciler().get(&key(1)).unwrap();
    assert_eq!(history.latest.pool.label(), "HYPE/USDC 0.30%");
    let metrics = history.last_metrics.unwrap();
    assert!(metrics.composition_value > 0.0);
    assert!(metrics.il.il_pct.abs() < 1e-9);
}

#[tokio::test]
async fn test_exit_and_reentry_notify_once_each() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    chain.set_tick(700);
    monitor.poll_at(1_030, &shutdown).await.unwrap();
    monitor.poll_at(1_060, &shutdown).await.unwrap();
    chain.set_tick(0);
    monitor.poll_at(1_090, &shutdown).await.unwrap();

    assert_eq!(
        recorder.kinds(),
        vec![(1, EventKind::ExitedRange), (1, EventKind::EnteredRange)]
    );
    let sent = recorder.sent.lock().unwrap();
    assert_eq!(sent[0].value_unit, "USD");
    assert!(sent[0].title().contains("out of range"));
}

#[tokio::test]
async fn test_replaced_position_closes_and_opens() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1, 2]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    chain.set_owned(wallet_a(), &[1, 3]);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();

    assert_eq!(report.closed, 1);
    assert_eq!(report.opened, 1);
    assert_eq!(report.tracked, 2);
    assert_eq!(
        recorder.kinds(),
        vec![(2, EventKind::PositionClosed), (3, EventKind::PositionOpened)]
    );
    let stored: HashSet<PositionKey> = monitor
        .store()
        .load_all()
        .unwrap()
        .into_iter()
        .map(|history| history.key)
        .collect();
    assert_eq!(stored, HashSet::from([key(1), key(3)]));

    // A kept its record and keeps sampling
    let history = monitor.reconciler().get(&key(1)).unwrap();
    assert_eq!(history.first_seen, 1_000);
    assert_eq!(history.fee_window.samples().len(), 2);

    recorder.clear();
    let again = monitor.poll_at(1_060, &shutdown).await.unwrap();
    assert_eq!(again.closed, 0);
    assert_eq!(again.opened, 0);
    assert!(recorder.kinds().is_empty());
}

#[tokio::test]
async fn test_failed_enumeration_defers_closure() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    chain.fail_wallet(wallet_a(), true);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();
    assert_eq!(report.closed, 0);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.tracked, 1);

    chain.fail_wallet(wallet_a(), false);
    let report = monitor.poll_at(1_060, &shutdown).await.unwrap();
    assert_eq!(report.deferred, 0);
    assert_eq!(report.tracked, 1);
    assert!(recorder.kinds().is_empty());
}

#[tokio::test]
async fn test_transfer_between_wallets_keeps_history() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    chain.set_owned(wallet_a(), &[]);
    chain.set_owned(wallet_b(), &[1]);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();

    assert_eq!(report.closed, 0);
    assert_eq!(report.opened, 0);
    assert!(recorder.kinds().is_empty());
    let history = monitor.reconciler().get(&key(1)).unwrap();
    assert_eq!(history.owner, wallet_b());
    assert_eq!(history.first_seen, 1_000);
}

#[tokio::test]
async fn test_withdrawn_liquidity_counts_as_closed() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    chain.set_liquidity(1, 0);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();

    assert_eq!(report.closed, 1);
    assert_eq!(report.tracked, 0);
    assert_eq!(recorder.kinds(), vec![(1, EventKind::PositionClosed)]);
}

#[tokio::test]
async fn test_pool_resolved_once() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1, 2]);
    chain.set_owned(wallet_b(), &[3]);
    let (mut monitor, _recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    monitor.poll_at(1_030, &shutdown).await.unwrap();
    assert_eq!(chain.discover_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_cycle_is_interrupted() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, _recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let report = monitor.poll_at(1_000, &shutdown).await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.tracked, 0);
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let shutdown = CancellationToken::new();

    {
        let (mut monitor, _recorder) = monitor_with(&chain, JsonFileStore::open(&path).unwrap());
        monitor.poll_at(1_000, &shutdown).await.unwrap();
    }

    chain.set_owned(wallet_a(), &[1, 2]);
    let (mut monitor, recorder) = monitor_with(&chain, JsonFileStore::open(&path).unwrap());
    assert_eq!(monitor.reconciler().len(), 1);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();

    assert_eq!(report.opened, 1);
    assert_eq!(recorder.kinds(), vec![(2, EventKind::PositionOpened)]);
    let history = monitor.reconciler().get(&key(1)).unwrap();
    assert_eq!(history.first_seen, 1_000);
    assert_eq!(history.fee_window.samples().len(), 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, _recorder) = monitor_with(&chain, MemoryStore::new());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), monitor.run(shutdown))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(monitor.reconciler().len(), 1);
}

#[tokio::test]
async fn test_exit_event_carries_rebalance_advice() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    monitor.poll_at(1_000, &shutdown).await.unwrap();
    chain.set_tick(700);
    monitor.poll_at(1_030, &shutdown).await.unwrap();

    let sent = recorder.sent.lock().unwrap();
    assert_eq!(sent[0].kind, EventKind::ExitedRange);
    let advice = sent[0].advice.as_ref().unwrap();
    assert!(advice.should_rebalance);
    assert_eq!(advice.urgency, RebalanceUrgency::High);
    assert!(advice.reasons.contains(&RebalanceReason::OutOfRange));
    assert!(advice.efficiency <= 60.0);
    assert!(sent[0].body().contains("Rebalance: recommended"));
}

#[tokio::test]
async fn test_portfolio_update_after_opened_and_closed() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1, 2]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    let first = monitor.poll_at(1_000, &shutdown).await.unwrap();
    assert!(first.portfolio_update.is_none());
    assert!(recorder.portfolio_updates().is_empty());
    assert_eq!(first.portfolio.positions, 2);
    assert_eq!(first.portfolio.in_range, 2);
    assert_eq!(first.portfolio.usd_positions, 2);
    assert!(first.portfolio.total_value_usd > 0.0);

    chain.set_owned(wallet_a(), &[1, 3]);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();
    let updates = recorder.portfolio_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!((updates[0].opened, updates[0].closed), (1, 1));
    assert_eq!(updates[0].summary.positions, 2);
    assert_eq!(report.portfolio_update.as_ref(), Some(&updates[0]));

    recorder.clear();
    let quiet = monitor.poll_at(1_060, &shutdown).await.unwrap();
    assert!(quiet.portfolio_update.is_none());
    assert!(recorder.portfolio_updates().is_empty());
}

#[tokio::test]
async fn test_threshold_band_cached_per_pool() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    let (mut monitor, _recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    let address = FakeChain::pool().address;
    assert!(monitor.threshold_config(&address).is_none());
    monitor.poll_at(1_000, &shutdown).await.unwrap();

    let expected = ThresholdConfig::for_pool(10, &config().thresholds);
    assert_eq!(monitor.threshold_config(&address), Some(&expected));
}

#[tokio::test]
async fn test_pair_recovering_from_failed_scan_stays_silent() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1]);
    chain.set_owned(wallet_b(), &[2]);
    chain.fail_wallet(wallet_b(), true);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());
    let shutdown = CancellationToken::new();

    let report = monitor.poll_at(1_000, &shutdown).await.unwrap();
    assert_eq!(report.tracked, 1);

    // First successful scan of wallet B, its position predates the monitor
    chain.fail_wallet(wallet_b(), false);
    let report = monitor.poll_at(1_030, &shutdown).await.unwrap();
    assert_eq!(report.opened, 1);
    assert_eq!(report.tracked, 2);
    assert!(recorder.kinds().is_empty());
    assert!(recorder.portfolio_updates().is_empty());

    chain.set_owned(wallet_b(), &[2, 3]);
    monitor.poll_at(1_060, &shutdown).await.unwrap();
    assert_eq!(recorder.kinds(), vec![(3, EventKind::PositionOpened)]);
}

#[tokio::test]
async fn test_shutdown_before_closure_keeps_history() {
    let chain = FakeChain::new();
    chain.set_owned(wallet_a(), &[1, 2]);
    let (mut monitor, recorder) = monitor_with(&chain, MemoryStore::new());

    monitor.poll_at(1_000, &CancellationToken::new()).await.unwrap();
    chain.set_owned(wallet_a(), &[1]);

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let report = monitor.poll_at(1_030, &cancelled).await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.closed, 0);
    assert!(monitor.reconciler().get(&key(2)).is_some());
    assert_eq!(monitor.store().load_all().unwrap().len(), 2);
    assert!(recorder.kinds().is_empty());

    let shutdown = CancellationToken::new();
    let report = monitor.poll_at(1_060, &shutdown).await.unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(recorder.kinds(), vec![(2, EventKind::PositionClosed)]);
    assert_eq!(monitor.store().load_all().unwrap().len(), 1);

    let again = monitor.poll_at(1_090, &shutdown).await.unwrap();
    assert_eq!(again.closed, 0);
    assert_eq!(recorder.kinds().len(), 1);
}
