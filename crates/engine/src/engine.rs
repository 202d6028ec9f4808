use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use optionsbot_core::{
    EngineConfig, EngineError, EngineStatus, MarketHours, Order, PersistenceSink, Position,
    PriceGateway, Signal, TradingMode,
};
use optionsbot_strategy::StrategyManager;
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::ledger::{Ledger, LedgerError};

/// Collaborators and state shared between the engine facade and its worker.
struct Shared {
    config: EngineConfig,
    manager: Arc<StrategyManager>,
    gateway: Arc<dyn PriceGateway>,
    sink: Arc<dyn PersistenceSink>,
    market_hours: MarketHours,
    ledger: RwLock<Ledger>,
    running: AtomicBool,
}

/// Clears the running flag when the worker ends, normally or by panic, so
/// external monitors never see a dead worker reported as running.
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

/// Paper trading engine: owns the ledger and drives the scheduling loop on a
/// single background worker.
///
/// `status`, `list_positions` and `list_orders` may be called concurrently
/// from any task; they read a point-in-time copy and never block the worker
/// beyond the duration of that copy.
pub struct PaperTradingEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl PaperTradingEngine {
    /// # Errors
    /// Returns an error if the configured market window cannot be parsed.
    pub fn new(
        config: EngineConfig,
        manager: Arc<StrategyManager>,
        gateway: Arc<dyn PriceGateway>,
        sink: Arc<dyn PersistenceSink>,
    ) -> anyhow::Result<Self> {
        let market_hours = MarketHours::from_config(&config)?;
        let ledger = Ledger::new(config.virtual_capital);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                manager,
                gateway,
                sink,
                market_hours,
                ledger: RwLock::new(ledger),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Spawns the background worker.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if a worker is active; no second worker is
    /// spawned.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut worker = self.worker.lock().await;
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        shared.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_worker(shared, stop_rx));
        *worker = Some((stop_tx, handle));

        tracing::info!("Paper trading engine started");
        log_event(&self.shared, "INFO", "engine started").await;
        Ok(())
    }

    /// Signals the worker to stop and joins it with a bounded timeout.
    ///
    /// # Errors
    /// Returns `NotRunning` when no worker is active; calling it twice in a
    /// row is safe and has no side effects.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut worker = self.worker.lock().await;
        let Some((stop_tx, handle)) = worker.take() else {
            return Err(EngineError::NotRunning);
        };
        if !self.shared.running.load(Ordering::SeqCst) && handle.is_finished() {
            // Worker already died on its own; just reap it.
            let _ = handle.await;
            return Err(EngineError::NotRunning);
        }

        let _ = stop_tx.send(true);
        let timeout = Duration::from_secs(self.shared.config.stop_join_timeout_secs);
        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => tracing::info!("Paper trading engine stopped"),
            Err(_) => {
                tracing::warn!("Worker did not stop within {:?}; aborting it", timeout);
                abort.abort();
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
        log_event(&self.shared, "INFO", "engine stopped").await;
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub async fn status(&self) -> EngineStatus {
        let market_open = self.shared.market_hours.is_open_now();
        self.shared
            .ledger
            .read()
            .await
            .status(self.is_running(), market_open)
    }

    #[must_use]
    pub async fn list_positions(&self) -> Vec<Position> {
        self.shared.ledger.read().await.positions()
    }

    #[must_use]
    pub async fn list_orders(&self) -> Vec<Order> {
        self.shared.ledger.read().await.orders()
    }
}

async fn log_event(shared: &Shared, level: &str, message: &str) {
    if let Err(e) = shared.sink.record_event(level, "engine", message).await {
        tracing::warn!("Event persistence failed: {}", e);
    }
}

/// Sleeps for `duration` unless the stop signal fires first. Returns true
/// when the worker should shut down.
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        _ = stop_rx.changed() => *stop_rx.borrow(),
    }
}

async fn run_worker(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let _guard = RunningGuard(Arc::clone(&shared));
    let cycle = Duration::from_secs(shared.config.cycle_interval_secs);
    let idle = Duration::from_secs(shared.config.idle_interval_secs);

    loop {
        if *stop_rx.borrow() {
            break;
        }

        if !shared.market_hours.is_open_now() {
            tracing::debug!("Market closed; idling");
            if sleep_or_stop(&mut stop_rx, idle).await {
                break;
            }
            continue;
        }

        // A failed cycle never ends the loop; back off briefly and retry.
        if let Err(e) = run_cycle(&shared).await {
            tracing::error!("Trading cycle failed: {:#}", e);
            log_event(&shared, "ERROR", &format!("cycle failed: {e:#}")).await;
            if sleep_or_stop(&mut stop_rx, Duration::from_secs(5)).await {
                break;
            }
            continue;
        }

        write_snapshot(&shared).await;

        if sleep_or_stop(&mut stop_rx, cycle).await {
            break;
        }
    }
    tracing::info!("Worker loop exited");
}

async fn run_cycle(shared: &Arc<Shared>) -> anyhow::Result<()> {
    let active = shared.manager.active_instances(TradingMode::Paper).await;
    tracing::debug!("Cycle start: {} active strategies", active.len());

    for name in active {
        // Per-strategy failures are isolated; the cycle moves on.
        if let Err(e) = run_strategy(shared, &name).await {
            tracing::error!("Strategy '{}' failed this cycle: {:#}", name, e);
            log_event(shared, "ERROR", &format!("strategy {name} failed: {e:#}")).await;
        }
    }

    refresh_marks(shared).await;
    Ok(())
}

async fn run_strategy(shared: &Arc<Shared>, name: &str) -> anyhow::Result<()> {
    let Some(handle) = shared.manager.strategy_handle(name).await else {
        tracing::warn!("Active strategy '{}' has no instance; skipping", name);
        return Ok(());
    };

    let signals = handle.lock().await.evaluate_entry().await?;
    for signal in signals {
        execute_entry(shared, name, &signal).await;
    }

    let open = shared.ledger.read().await.open_positions_for(name);
    for position in open {
        let wants_exit = match handle.lock().await.evaluate_exit(&position).await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!(
                    "Exit check failed for {} ({}): {:#}",
                    position.position_id,
                    name,
                    e
                );
                continue;
            }
        };
        if wants_exit {
            execute_exit(shared, name, &position.position_id).await;
        }
    }
    Ok(())
}

async fn execute_entry(shared: &Arc<Shared>, strategy_name: &str, signal: &Signal) {
    let required = signal.notional();
    let available = shared.ledger.read().await.available_capital();
    if required > available {
        tracing::info!(
            "Skipping {} entry for '{}': requires {}, available {}",
            signal.symbol,
            strategy_name,
            required,
            available
        );
        return;
    }

    let Some(fill_price) = fetch_price(shared, &signal.symbol).await else {
        tracing::debug!("No price for {}; entry retried next cycle", signal.symbol);
        return;
    };

    let booking = {
        let mut ledger = shared.ledger.write().await;
        match ledger.open_entry(strategy_name, signal, fill_price) {
            Ok(booking) => booking,
            Err(LedgerError::InsufficientCapital { required, available }) => {
                tracing::info!(
                    "Skipping {} entry for '{}': requires {}, available {}",
                    signal.symbol,
                    strategy_name,
                    required,
                    available
                );
                return;
            }
            Err(e) => {
                tracing::error!("Entry booking failed: {}", e);
                return;
            }
        }
    };

    tracing::info!(
        "Entered {} x{} @ {} for '{}' ({} / {})",
        booking.position.symbol,
        booking.position.quantity,
        fill_price,
        strategy_name,
        booking.order.order_id,
        booking.position.position_id
    );

    // Ledger stays authoritative; persistence failures are logged only.
    if let Err(e) = shared
        .sink
        .record_order(&booking.order, TradingMode::Paper)
        .await
    {
        tracing::warn!("Order persistence failed for {}: {}", booking.order.order_id, e);
    }
    if let Err(e) = shared
        .sink
        .record_position(&booking.position, TradingMode::Paper)
        .await
    {
        tracing::warn!(
            "Position persistence failed for {}: {}",
            booking.position.position_id,
            e
        );
    }
}

async fn execute_exit(shared: &Arc<Shared>, strategy_name: &str, position_id: &str) {
    let Some(position) = shared.ledger.read().await.position(position_id) else {
        return;
    };
    let symbol = position.symbol;

    let Some(exit_price) = fetch_price(shared, &symbol).await else {
        tracing::debug!("No price for {}; exit retried next cycle", symbol);
        return;
    };

    let booking = {
        let mut ledger = shared.ledger.write().await;
        match ledger.close_exit(position_id, exit_price) {
            Ok(booking) => booking,
            Err(e) => {
                tracing::warn!("Exit booking refused for {}: {}", position_id, e);
                return;
            }
        }
    };

    tracing::info!(
        "Exited {} @ {} for '{}': realized {}",
        booking.position.symbol,
        exit_price,
        strategy_name,
        booking.realized_pnl
    );

    shared
        .manager
        .record_trade_outcome(strategy_name, booking.realized_pnl)
        .await;

    if let Err(e) = shared
        .sink
        .record_order(&booking.order, TradingMode::Paper)
        .await
    {
        tracing::warn!("Order persistence failed for {}: {}", booking.order.order_id, e);
    }
    if let Err(e) = shared
        .sink
        .record_position(&booking.position, TradingMode::Paper)
        .await
    {
        tracing::warn!(
            "Position persistence failed for {}: {}",
            booking.position.position_id,
            e
        );
    }
}

async fn fetch_price(shared: &Arc<Shared>, symbol: &str) -> Option<Decimal> {
    match shared.gateway.last_price(symbol).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!("Price fetch failed for {}: {}", symbol, e);
            None
        }
    }
}

async fn refresh_marks(shared: &Arc<Shared>) {
    let symbols = shared.ledger.read().await.open_symbols();
    if symbols.is_empty() {
        return;
    }
    let prices: HashMap<String, Decimal> = match shared.gateway.last_prices(&symbols).await {
        Ok(prices) => prices,
        Err(e) => {
            tracing::warn!("Mark-to-market fetch failed: {}", e);
            return;
        }
    };
    shared.ledger.write().await.mark_positions(&prices);
}

async fn write_snapshot(shared: &Arc<Shared>) {
    let snapshot = shared.ledger.read().await.snapshot();
    let json = match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Snapshot serialization failed: {}", e);
            return;
        }
    };
    if let Err(e) = tokio::fs::write(&shared.config.snapshot_path, json).await {
        tracing::warn!(
            "Snapshot write to {} failed: {}",
            shared.config.snapshot_path,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use optionsbot_core::{Position, Strategy};
    use optionsbot_strategy::{RiskLimits, StrategyFactory};
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct MapGateway {
        prices: StdMutex<HashMap<String, Decimal>>,
    }

    impl MapGateway {
        fn new(prices: &[(&str, Decimal)]) -> Arc<Self> {
            Arc::new(Self {
                prices: StdMutex::new(
                    prices
                        .iter()
                        .map(|(s, p)| ((*s).to_string(), *p))
                        .collect(),
                ),
            })
        }

        fn set(&self, symbol: &str, price: Decimal) {
            self.prices
                .lock()
                .unwrap()
                .insert(symbol.to_string(), price);
        }
    }

    #[async_trait]
    impl PriceGateway for MapGateway {
        async fn last_prices(
            &self,
            symbols: &[String],
        ) -> anyhow::Result<HashMap<String, Decimal>> {
            let prices = self.prices.lock().unwrap();
            Ok(symbols
                .iter()
                .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
                .collect())
        }

        fn is_authenticated(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CountingSink {
        orders: StdMutex<u64>,
        positions: StdMutex<u64>,
    }

    #[async_trait]
    impl PersistenceSink for CountingSink {
        async fn record_order(&self, _order: &Order, _mode: TradingMode) -> anyhow::Result<()> {
            *self.orders.lock().unwrap() += 1;
            Ok(())
        }

        async fn record_position(
            &self,
            _position: &Position,
            _mode: TradingMode,
        ) -> anyhow::Result<()> {
            *self.positions.lock().unwrap() += 1;
            Ok(())
        }

        async fn record_event(
            &self,
            _level: &str,
            _component: &str,
            _message: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Emits one fixed signal on the first entry evaluation; when `exit` is
    /// set, asks out of any position whose mark has moved above its entry.
    struct ScriptedStrategy {
        name: String,
        signal: Option<Signal>,
        exit: bool,
    }

    #[async_trait]
    impl Strategy for ScriptedStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        async fn evaluate_entry(&mut self) -> anyhow::Result<Vec<Signal>> {
            Ok(self.signal.take().into_iter().collect())
        }

        async fn evaluate_exit(&mut self, position: &Position) -> anyhow::Result<bool> {
            Ok(self.exit && position.current_price > position.entry_price)
        }
    }

    struct ScriptedFactory {
        signal: Signal,
        exit: bool,
    }

    impl StrategyFactory for ScriptedFactory {
        fn class_name(&self) -> &str {
            "scripted"
        }

        fn supported_modes(&self) -> &[TradingMode] {
            &[TradingMode::Paper]
        }

        fn create(
            &self,
            name: &str,
            _parameters: &serde_json::Value,
        ) -> anyhow::Result<Box<dyn Strategy>> {
            Ok(Box::new(ScriptedStrategy {
                name: name.to_string(),
                signal: Some(self.signal.clone()),
                exit: self.exit,
            }))
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            snapshot_path: std::env::temp_dir()
                .join(format!("optionsbot_snapshot_{}.json", std::process::id()))
                .to_string_lossy()
                .into_owned(),
            ..EngineConfig::default()
        }
    }

    async fn engine_with(
        gateway: Arc<MapGateway>,
        signal: Signal,
        exit: bool,
    ) -> (PaperTradingEngine, Arc<StrategyManager>) {
        let manager = Arc::new(StrategyManager::new(gateway.clone()));
        manager
            .register_class(Arc::new(ScriptedFactory { signal, exit }))
            .await
            .unwrap();
        manager
            .create_instance(
                "s1",
                "scripted",
                serde_json::Value::Null,
                TradingMode::Paper,
                dec!(200000),
                RiskLimits::default(),
            )
            .await
            .unwrap();
        manager.activate("s1").await.unwrap();

        let engine = PaperTradingEngine::new(
            test_config(),
            Arc::clone(&manager),
            gateway,
            Arc::new(CountingSink::default()),
        )
        .unwrap();
        (engine, manager)
    }

    fn entry_signal() -> Signal {
        Signal {
            symbol: "NIFTY24500CE".to_string(),
            quantity: dec!(50),
            entry_price: dec!(100),
        }
    }

    #[tokio::test]
    async fn stop_when_not_running_is_a_safe_failure() {
        let gateway = MapGateway::new(&[]);
        let (engine, _manager) = engine_with(gateway, entry_signal(), false).await;

        assert!(matches!(engine.stop().await, Err(EngineError::NotRunning)));
        assert!(!engine.is_running());

        engine.start().await.unwrap();
        assert!(engine.is_running());
        assert!(matches!(
            engine.start().await,
            Err(EngineError::AlreadyRunning)
        ));

        engine.stop().await.unwrap();
        assert!(!engine.is_running());
        assert!(matches!(engine.stop().await, Err(EngineError::NotRunning)));
    }

    #[tokio::test]
    async fn cycle_books_entry_at_gateway_price() {
        let gateway = MapGateway::new(&[("NIFTY24500CE", dec!(100))]);
        let (engine, _manager) = engine_with(gateway, entry_signal(), false).await;

        run_cycle(&engine.shared).await.unwrap();

        let status = engine.status().await;
        assert_eq!(status.available_capital, dec!(195000));
        assert_eq!(status.active_positions, 1);
        let orders = engine.list_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].execution_price, Some(dec!(100)));
        let positions = engine.list_positions().await;
        assert_eq!(positions[0].entry_price, dec!(100));
        assert_eq!(positions[0].quantity, dec!(50));
    }

    #[tokio::test]
    async fn insufficient_capital_skips_the_signal_without_mutation() {
        let gateway = MapGateway::new(&[("NIFTY24500CE", dec!(100))]);
        let signal = Signal {
            symbol: "NIFTY24500CE".to_string(),
            quantity: dec!(50),
            entry_price: dec!(100),
        };
        let manager = Arc::new(StrategyManager::new(gateway.clone()));
        manager
            .register_class(Arc::new(ScriptedFactory {
                signal,
                exit: false,
            }))
            .await
            .unwrap();
        manager
            .create_instance(
                "s1",
                "scripted",
                serde_json::Value::Null,
                TradingMode::Paper,
                dec!(1000),
                RiskLimits::default(),
            )
            .await
            .unwrap();
        manager.activate("s1").await.unwrap();

        let config = EngineConfig {
            virtual_capital: dec!(1000),
            ..test_config()
        };
        let engine = PaperTradingEngine::new(
            config,
            manager,
            gateway,
            Arc::new(CountingSink::default()),
        )
        .unwrap();

        run_cycle(&engine.shared).await.unwrap();

        let status = engine.status().await;
        assert_eq!(status.available_capital, dec!(1000));
        assert!(engine.list_orders().await.is_empty());
        assert!(engine.list_positions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_market_leaves_the_ledger_untouched() {
        let gateway = MapGateway::new(&[("NIFTY24500CE", dec!(100))]);
        let manager = Arc::new(StrategyManager::new(gateway.clone()));
        manager
            .register_class(Arc::new(ScriptedFactory {
                signal: entry_signal(),
                exit: false,
            }))
            .await
            .unwrap();
        manager
            .create_instance(
                "s1",
                "scripted",
                serde_json::Value::Null,
                TradingMode::Paper,
                dec!(200000),
                RiskLimits::default(),
            )
            .await
            .unwrap();
        manager.activate("s1").await.unwrap();

        // An empty session window: no time of day satisfies open <= t <= close.
        let config = EngineConfig {
            market_open: "23:59".to_string(),
            market_close: "00:00".to_string(),
            ..test_config()
        };
        let virtual_capital = config.virtual_capital;
        let engine =
            PaperTradingEngine::new(config, manager, gateway, Arc::new(CountingSink::default()))
                .unwrap();

        engine.start().await.unwrap();
        // Paused clock auto-advances through several idle sleeps.
        tokio::time::sleep(Duration::from_secs(600)).await;
        engine.stop().await.unwrap();

        let status = engine.status().await;
        assert!(!status.market_open);
        assert_eq!(status.available_capital, virtual_capital);
        assert!(engine.list_orders().await.is_empty());
        assert!(engine.list_positions().await.is_empty());
    }

    #[tokio::test]
    async fn exit_cycle_books_pnl_and_strategy_counters() {
        let gateway = MapGateway::new(&[("NIFTY24500CE", dec!(100))]);
        let (engine, manager) = engine_with(gateway.clone(), entry_signal(), true).await;

        // Cycle 1 enters at 100 and marks at 100. The price then rises; the
        // mark catches up in cycle 2 and the exit fires in cycle 3 at 110.
        run_cycle(&engine.shared).await.unwrap();
        gateway.set("NIFTY24500CE", dec!(110));
        run_cycle(&engine.shared).await.unwrap();
        run_cycle(&engine.shared).await.unwrap();

        let status = engine.status().await;
        assert_eq!(status.total_pnl, dec!(500));
        assert_eq!(status.winning_trades, 1);
        assert_eq!(status.available_capital, dec!(200500));
        assert_eq!(status.active_positions, 0);

        let perf = manager.instance("s1").await.unwrap().performance;
        assert_eq!(perf.total_trades, 1);
        assert_eq!(perf.winning_trades, 1);
        assert_eq!(perf.total_pnl, dec!(500));
    }

    #[tokio::test]
    async fn missing_mark_price_leaves_position_untouched() {
        let gateway = MapGateway::new(&[("NIFTY24500CE", dec!(100))]);
        let (engine, _manager) = engine_with(gateway.clone(), entry_signal(), false).await;

        run_cycle(&engine.shared).await.unwrap();
        // Quote disappears; refresh must tolerate the gap.
        gateway.prices.lock().unwrap().clear();
        run_cycle(&engine.shared).await.unwrap();

        let positions = engine.list_positions().await;
        assert_eq!(positions[0].current_price, dec!(100));
        assert_eq!(positions[0].unrealized_pnl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn strategy_failure_does_not_poison_the_cycle() {
        struct FailingStrategy;

        #[async_trait]
        impl Strategy for FailingStrategy {
            fn name(&self) -> &str {
                "failing"
            }

            async fn evaluate_entry(&mut self) -> anyhow::Result<Vec<Signal>> {
                anyhow::bail!("boom")
            }

            async fn evaluate_exit(&mut self, _position: &Position) -> anyhow::Result<bool> {
                Ok(false)
            }
        }

        struct FailingFactory;

        impl StrategyFactory for FailingFactory {
            fn class_name(&self) -> &str {
                "failing"
            }

            fn supported_modes(&self) -> &[TradingMode] {
                &[TradingMode::Paper]
            }

            fn create(
                &self,
                _name: &str,
                _parameters: &serde_json::Value,
            ) -> anyhow::Result<Box<dyn Strategy>> {
                Ok(Box::new(FailingStrategy))
            }
        }

        let gateway = MapGateway::new(&[("NIFTY24500CE", dec!(100))]);
        let (engine, manager) = engine_with(gateway, entry_signal(), false).await;
        manager.register_class(Arc::new(FailingFactory)).await.unwrap();
        manager
            .create_instance(
                "bad",
                "failing",
                serde_json::Value::Null,
                TradingMode::Paper,
                dec!(1000),
                RiskLimits::default(),
            )
            .await
            .unwrap();
        manager.activate("bad").await.unwrap();

        run_cycle(&engine.shared).await.unwrap();

        // The healthy strategy still traded.
        assert_eq!(engine.list_orders().await.len(), 1);
    }
}

