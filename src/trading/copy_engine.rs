//! Copy-trade engine: turns tracker notifications into buy/sell orders
//! with idempotent execution bookkeeping.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{AccountSnapshot, Position};
use crate::tracker::{PositionTracker, TrackerListener};

use super::{OrderFill, OrderGateway, TradingConfig};

/// Running statistics, mutated only after an order attempt resolves.
#[derive(Debug, Clone)]
pub struct CopyStats {
    pub trades_executed: u64,
    pub trades_failed: u64,
    pub total_volume: Decimal,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub copy_enabled: bool,
    pub dry_run: bool,
}

impl CopyStats {
    fn new(config: &TradingConfig) -> Self {
        Self {
            trades_executed: 0,
            trades_failed: 0,
            total_volume: Decimal::ZERO,
            last_trade_at: None,
            copy_enabled: config.copy_enabled,
            dry_run: config.dry_run,
        }
    }
}

impl std::fmt::Display for CopyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Copy-Trading Statistics ===")?;
        writeln!(f, "Trades Executed: {}", self.trades_executed)?;
        writeln!(f, "Trades Failed:   {}", self.trades_failed)?;
        writeln!(f, "Total Volume:    ${:.2}", self.total_volume)?;
        writeln!(
            f,
            "Last Trade:      {}",
            self.last_trade_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "Never".to_string())
        )?;
        writeln!(
            f,
            "Mode:            {} {}",
            if self.copy_enabled { "Copy-trading" } else { "Observe-only" },
            if self.dry_run { "(Dry Run)" } else { "" }
        )?;
        Ok(())
    }
}

/// Mirrors position changes of the tracked account.
///
/// Consumes tracker updates, diffs the current position set against the
/// last-seen one, and buys newly opened positions / sells closed ones.
/// The execution ledger records which positions this engine itself opened;
/// only those are ever sold.
pub struct CopyEngine {
    config: TradingConfig,
    tracker: Arc<PositionTracker>,
    gateway: Arc<dyn OrderGateway>,

    /// Last-seen target positions keyed by id, replaced every cycle.
    target_positions: RwLock<HashMap<String, Position>>,

    /// Ids bought by this engine and not yet sold.
    executed_buys: RwLock<HashSet<String>>,

    stats: RwLock<CopyStats>,

    /// Set once the engine has registered with the tracker, so a
    /// stop/start cycle cannot subscribe it twice.
    listener_registered: AtomicBool,
}

impl CopyEngine {
    pub fn new(
        config: TradingConfig,
        tracker: Arc<PositionTracker>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Self {
        let stats = CopyStats::new(&config);
        Self {
            config,
            tracker,
            gateway,
            target_positions: RwLock::new(HashMap::new()),
            executed_buys: RwLock::new(HashSet::new()),
            stats: RwLock::new(stats),
            listener_registered: AtomicBool::new(false),
        }
    }

    /// Start the engine and the underlying tracker.
    ///
    /// With copy-trading disabled the tracker runs observe-only and no
    /// order path is wired up. Gateway initialization failure is fatal in
    /// live mode; in dry-run it is logged and ignored, since simulated
    /// orders need no credentials.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.tracker.is_running() {
            warn!("Copy engine already running");
            return Ok(());
        }

        if !self.config.copy_enabled {
            info!(
                target = %self.tracker.address(),
                "Copy-trading disabled, monitoring only"
            );
            return Arc::clone(&self.tracker).start().await;
        }

        match self.gateway.initialize().await {
            Ok(()) => {
                if let Some(wallet) = self.gateway.wallet_address() {
                    info!(wallet = %wallet, "Trading as");
                }
            }
            Err(error) if self.config.dry_run => {
                warn!(
                    error = %error,
                    "Order gateway initialization failed, continuing in dry-run"
                );
            }
            Err(error) => {
                return Err(error).context("Order gateway initialization failed");
            }
        }

        if !self.listener_registered.swap(true, Ordering::SeqCst) {
            self.tracker
                .add_listener(Arc::clone(&self) as Arc<dyn TrackerListener>)
                .await;
        }

        info!(
            target = %self.tracker.address(),
            dry_run = self.config.dry_run,
            "Copy-trading engine started"
        );

        Arc::clone(&self.tracker).start().await
    }

    /// Stop the underlying tracker. Always succeeds.
    pub async fn stop(&self) {
        self.tracker.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.tracker.is_running()
    }

    pub async fn get_stats(&self) -> CopyStats {
        self.stats.read().await.clone()
    }

    /// One diff-and-execute cycle for an accepted snapshot.
    ///
    /// Order attempts run sequentially, one position at a time; a failure
    /// is folded into the stats and never blocks the rest of the cycle.
    /// The target map is replaced unconditionally at the end, whatever the
    /// execution outcomes were.
    async fn process_snapshot(&self, snapshot: &AccountSnapshot) {
        let current = snapshot.position_map();
        let previous = self.target_positions.read().await.clone();

        let opened: Vec<&Position> = snapshot
            .positions
            .iter()
            .filter(|p| !previous.contains_key(&p.id))
            .collect();
        let closed: Vec<&Position> = previous
            .values()
            .filter(|p| !current.contains_key(&p.id))
            .collect();

        if !opened.is_empty() || !closed.is_empty() {
            info!(
                opened = opened.len(),
                closed = closed.len(),
                "Target position set changed"
            );
        }

        for position in opened {
            if self.executed_buys.read().await.contains(&position.id) {
                debug!(position = %position.id, "Buy already executed, skipping");
                continue;
            }
            self.execute_buy(position).await;
        }

        for position in closed {
            if !self.executed_buys.read().await.contains(&position.id) {
                debug!(
                    position = %position.id,
                    "Closed position was never mirrored, ignoring"
                );
                continue;
            }
            self.execute_sell(position).await;
        }

        *self.target_positions.write().await = current;
    }

    async fn execute_buy(&self, position: &Position) {
        match self.gateway.buy(position).await {
            Ok(fill) if fill.success => {
                self.executed_buys.write().await.insert(position.id.clone());
                self.record_fill(&fill).await;
                info!(
                    market = %position.market_title,
                    outcome = %position.outcome,
                    "Copy buy executed"
                );
            }
            Ok(fill) => {
                self.record_failure().await;
                warn!(
                    position = %position.id,
                    error = fill.error.as_deref().unwrap_or("rejected"),
                    "Copy buy not filled"
                );
            }
            Err(error) => {
                self.record_failure().await;
                warn!(position = %position.id, error = %error, "Copy buy failed");
            }
        }
    }

    async fn execute_sell(&self, position: &Position) {
        match self.gateway.sell(position).await {
            Ok(fill) if fill.success => {
                self.executed_buys.write().await.remove(&position.id);
                self.record_fill(&fill).await;
                info!(
                    market = %position.market_title,
                    outcome = %position.outcome,
                    "Copy sell executed"
                );
            }
            Ok(fill) => {
                // Id stays in the ledger; a later closed transition retries.
                self.record_failure().await;
                warn!(
                    position = %position.id,
                    error = fill.error.as_deref().unwrap_or("rejected"),
                    "Copy sell not filled"
                );
            }
            Err(error) => {
                self.record_failure().await;
                warn!(position = %position.id, error = %error, "Copy sell failed");
            }
        }
    }

    async fn record_fill(&self, fill: &OrderFill) {
        let mut stats = self.stats.write().await;
        stats.trades_executed += 1;
        stats.total_volume += fill.notional();
        stats.last_trade_at = Some(Utc::now());
    }

    async fn record_failure(&self) {
        self.stats.write().await.trades_failed += 1;
    }
}

#[async_trait]
impl TrackerListener for CopyEngine {
    async fn on_update(&self, snapshot: &AccountSnapshot) {
        self.process_snapshot(snapshot).await;
    }

    async fn on_error(&self, error: &anyhow::Error) {
        debug!(error = %error, "Tracker reported a fetch error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::anyhow;
    use rust_decimal_macros::dec;

    use crate::tracker::SnapshotSource;

    fn position(id: &str, size: Decimal, price: Decimal) -> Position {
        Position {
            id: id.to_string(),
            market_id: format!("0xmarket-{}", id),
            market_title: format!("Market {}", id),
            outcome: "Yes".to_string(),
            size,
            price,
        }
    }

    fn snapshot(positions: Vec<Position>, total_value: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            address: "0xtarget".to_string(),
            positions,
            total_value,
            fetched_at: Utc::now(),
        }
    }

    /// Pass-through fill at the position's own size and price.
    #[derive(Default)]
    struct RecordingGateway {
        buys: Mutex<Vec<String>>,
        sells: Mutex<Vec<String>>,
        fail_buys: bool,
        fail_sells: bool,
        fail_initialize: bool,
    }

    impl RecordingGateway {
        fn buy_ids(&self) -> Vec<String> {
            self.buys.lock().unwrap().clone()
        }

        fn sell_ids(&self) -> Vec<String> {
            self.sells.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderGateway for RecordingGateway {
        async fn initialize(&self) -> Result<()> {
            if self.fail_initialize {
                return Err(anyhow!("missing credentials"));
            }
            Ok(())
        }

        async fn buy(&self, position: &Position) -> Result<OrderFill> {
            self.buys.lock().unwrap().push(position.id.clone());
            if self.fail_buys {
                return Ok(OrderFill::rejected("no liquidity"));
            }
            Ok(OrderFill::filled(position.size, position.price))
        }

        async fn sell(&self, position: &Position) -> Result<OrderFill> {
            self.sells.lock().unwrap().push(position.id.clone());
            if self.fail_sells {
                return Ok(OrderFill::rejected("no liquidity"));
            }
            Ok(OrderFill::filled(position.size, position.price))
        }

        fn wallet_address(&self) -> Option<String> {
            Some("0xwallet".to_string())
        }
    }

    struct SingleSnapshotSource {
        snapshot: AccountSnapshot,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotSource for SingleSnapshotSource {
        async fn fetch_snapshot(&self, _address: &str) -> Result<AccountSnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }
    }

    fn idle_tracker(snapshot: AccountSnapshot) -> (Arc<PositionTracker>, Arc<SingleSnapshotSource>) {
        let source = Arc::new(SingleSnapshotSource {
            snapshot,
            fetches: AtomicUsize::new(0),
        });
        let tracker = Arc::new(PositionTracker::new(
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            "0xtarget".to_string(),
            Duration::from_secs(600),
        ));
        (tracker, source)
    }

    fn engine_with(
        config: TradingConfig,
        gateway: Arc<RecordingGateway>,
    ) -> Arc<CopyEngine> {
        let (tracker, _) = idle_tracker(snapshot(vec![], dec!(0)));
        Arc::new(CopyEngine::new(config, tracker, gateway))
    }

    fn enabled_config() -> TradingConfig {
        TradingConfig {
            copy_enabled: true,
            dry_run: true,
            ..TradingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_buys_new_then_sells_closed() {
        let gateway = Arc::new(RecordingGateway::default());
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        // Cycle 1: one open position, bought.
        let a = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        engine.process_snapshot(&a).await;

        // Cycle 2: target closed everything, sold.
        let b = snapshot(vec![], dec!(0));
        engine.process_snapshot(&b).await;

        assert_eq!(gateway.buy_ids(), vec!["1"]);
        assert_eq!(gateway.sell_ids(), vec!["1"]);

        let stats = engine.get_stats().await;
        assert_eq!(stats.trades_executed, 2);
        assert_eq!(stats.trades_failed, 0);
        // Both fills at 10 shares x 0.50.
        assert_eq!(stats.total_volume, dec!(10));
        assert!(stats.last_trade_at.is_some());
    }

    #[tokio::test]
    async fn test_reappearance_after_sell_triggers_fresh_buy() {
        let gateway = Arc::new(RecordingGateway::default());
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        let open = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        let flat = snapshot(vec![], dec!(0));

        engine.process_snapshot(&open).await;
        engine.process_snapshot(&flat).await;
        engine.process_snapshot(&open).await;

        assert_eq!(gateway.buy_ids(), vec!["1", "1"]);
        assert_eq!(gateway.sell_ids(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_never_sells_positions_it_did_not_open() {
        let gateway = Arc::new(RecordingGateway {
            fail_buys: true,
            ..RecordingGateway::default()
        });
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        // Buy attempt fails, so the ledger stays empty.
        let open = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        engine.process_snapshot(&open).await;

        // Position disappears; nothing to unwind.
        let flat = snapshot(vec![], dec!(0));
        engine.process_snapshot(&flat).await;

        assert_eq!(gateway.buy_ids().len(), 1);
        assert!(gateway.sell_ids().is_empty());

        let stats = engine.get_stats().await;
        assert_eq!(stats.trades_executed, 0);
        assert_eq!(stats.trades_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_buy_is_not_retried_while_position_persists() {
        let gateway = Arc::new(RecordingGateway {
            fail_buys: true,
            ..RecordingGateway::default()
        });
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        let open = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        engine.process_snapshot(&open).await;
        // Position still open on the next cycle: no longer "new", no retry.
        engine.process_snapshot(&open).await;

        assert_eq!(gateway.buy_ids().len(), 1);
        let stats = engine.get_stats().await;
        assert_eq!(stats.trades_executed, 0);
        assert_eq!(stats.trades_failed, 1);
    }

    #[tokio::test]
    async fn test_failing_buys_count_once_per_attempted_cycle() {
        let gateway = Arc::new(RecordingGateway {
            fail_buys: true,
            ..RecordingGateway::default()
        });
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        let open = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        let flat = snapshot(vec![], dec!(0));

        // Disappear/reappear requalifies the position as new each time.
        engine.process_snapshot(&open).await;
        engine.process_snapshot(&flat).await;
        engine.process_snapshot(&open).await;

        assert_eq!(gateway.buy_ids().len(), 2);
        assert!(gateway.sell_ids().is_empty());

        let stats = engine.get_stats().await;
        assert_eq!(stats.trades_executed, 0);
        assert_eq!(stats.trades_failed, 2);
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_ledger_entry() {
        let gateway = Arc::new(RecordingGateway {
            fail_sells: true,
            ..RecordingGateway::default()
        });
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        let open = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        let flat = snapshot(vec![], dec!(0));

        engine.process_snapshot(&open).await;
        engine.process_snapshot(&flat).await;

        assert_eq!(gateway.sell_ids().len(), 1);
        assert!(engine.executed_buys.read().await.contains("1"));

        let stats = engine.get_stats().await;
        assert_eq!(stats.trades_executed, 1);
        assert_eq!(stats.trades_failed, 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_rest_of_the_cycle() {
        let gateway = Arc::new(RecordingGateway {
            fail_buys: true,
            ..RecordingGateway::default()
        });
        let engine = engine_with(enabled_config(), Arc::clone(&gateway));

        let open = snapshot(
            vec![
                position("1", dec!(10), dec!(0.5)),
                position("2", dec!(20), dec!(0.3)),
                position("3", dec!(30), dec!(0.7)),
            ],
            dec!(30),
        );
        engine.process_snapshot(&open).await;

        // Every position was still attempted.
        assert_eq!(gateway.buy_ids().len(), 3);
        assert_eq!(engine.get_stats().await.trades_failed, 3);
    }

    #[tokio::test]
    async fn test_disabled_engine_never_touches_the_gateway() {
        let gateway = Arc::new(RecordingGateway::default());
        let source_snapshot = snapshot(vec![position("1", dec!(10), dec!(0.5))], dec!(5));
        let (tracker, source) = idle_tracker(source_snapshot);

        let config = TradingConfig::default(); // copy_enabled: false
        let engine = Arc::new(CopyEngine::new(
            config,
            Arc::clone(&tracker),
            Arc::clone(&gateway) as Arc<dyn OrderGateway>,
        ));

        // Observe-only listener to prove updates still flow.
        #[derive(Default)]
        struct CountingListener {
            updates: AtomicUsize,
        }

        #[async_trait]
        impl TrackerListener for CountingListener {
            async fn on_update(&self, _snapshot: &AccountSnapshot) {
                self.updates.fetch_add(1, Ordering::SeqCst);
            }
        }

        let listener = Arc::new(CountingListener::default());
        tracker.add_listener(Arc::clone(&listener) as Arc<dyn TrackerListener>).await;

        Arc::clone(&engine).start().await.unwrap();
        assert!(engine.is_running());

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(listener.updates.load(Ordering::SeqCst), 1);
        assert!(gateway.buy_ids().is_empty());
        assert!(gateway.sell_ids().is_empty());

        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_initialization_failure_is_fatal_in_live_mode() {
        let gateway = Arc::new(RecordingGateway {
            fail_initialize: true,
            ..RecordingGateway::default()
        });
        let (tracker, _) = idle_tracker(snapshot(vec![], dec!(0)));

        let config = TradingConfig {
            copy_enabled: true,
            dry_run: false,
            ..TradingConfig::default()
        };
        let engine = Arc::new(CopyEngine::new(
            config,
            tracker,
            Arc::clone(&gateway) as Arc<dyn OrderGateway>,
        ));

        assert!(Arc::clone(&engine).start().await.is_err());
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_initialization_failure_is_tolerated_in_dry_run() {
        let gateway = Arc::new(RecordingGateway {
            fail_initialize: true,
            ..RecordingGateway::default()
        });
        let (tracker, _) = idle_tracker(snapshot(vec![], dec!(0)));

        let config = TradingConfig {
            copy_enabled: true,
            dry_run: true,
            ..TradingConfig::default()
        };
        let engine = Arc::new(CopyEngine::new(
            config,
            tracker,
            Arc::clone(&gateway) as Arc<dyn OrderGateway>,
        ));

        Arc::clone(&engine).start().await.unwrap();
        assert!(engine.is_running());
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_stats_echo_configuration() {
        let gateway = Arc::new(RecordingGateway::default());
        let engine = engine_with(enabled_config(), gateway);

        let stats = engine.get_stats().await;
        assert!(stats.copy_enabled);
        assert!(stats.dry_run);
        assert_eq!(stats.trades_executed, 0);
        assert_eq!(stats.total_volume, Decimal::ZERO);
    }
}
