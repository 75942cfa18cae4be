//! End-to-end engine tests
//!
//! Wire the full stack against the scripted market-data mock: universe
//! selection, staged bringup, stream subscription and routing, dwell
//! promotion, position open/close, and the closed-position sink.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::watch;

use marlin::application::{FleetIndex, StagedBringupController, SubscriptionOrchestrator};
use marlin::config::Config;
use marlin::domain::position::CloseReason;
use marlin::ports::mocks::{MockMarketData, RecordingSink, StaticSelector};
use marlin::ports::TopSymbolSelector;

fn test_config() -> Config {
    let mut config = Config::default();
    config.signals.dwell_seconds = 1;
    config.bringup.batch_size = 10;
    config.bringup.max_attempts = 2;
    config.bringup.attempt_delay_seconds = 1;
    config.bringup.batch_cooldown_seconds = 1;
    config
}

/// Fat ask at 105 and fat bid at 95 against uniform 5-volume levels;
/// threshold comes out at 10 so only the 50-volume levels become blocks.
fn scripted_mock(symbols: &[&str]) -> Arc<MockMarketData> {
    let mut mock = MockMarketData::new();
    for symbol in symbols {
        mock = mock.with_symbol(
            symbol,
            dec!(1),
            vec![(dec!(101), dec!(5)), (dec!(105), dec!(50))],
            vec![(dec!(100), dec!(5)), (dec!(95), dec!(50))],
            vec![dec!(10); 20],
        );
    }
    Arc::new(mock)
}

struct Stack {
    mock: Arc<MockMarketData>,
    sink: Arc<RecordingSink>,
    fleet: Arc<FleetIndex>,
    orchestrator: Arc<SubscriptionOrchestrator>,
    bringup: StagedBringupController,
    symbols: Vec<String>,
}

async fn build_stack(scripted: &[&str], universe: Vec<String>, denylist: Vec<String>) -> Stack {
    let config = test_config();
    let mock = scripted_mock(scripted);
    let sink = Arc::new(RecordingSink::new());
    let selector = StaticSelector::new(universe, denylist);
    let symbols = selector
        .top_symbols_by_volume(config.universe.top_n)
        .await
        .expect("selector");

    let fleet = Arc::new(FleetIndex::build(
        &symbols,
        &config.engine(),
        mock.clone(),
        sink.clone(),
    ));
    let orchestrator = Arc::new(SubscriptionOrchestrator::new(
        mock.clone(),
        fleet.clone(),
        &config,
    ));
    let bringup = StagedBringupController::new(fleet.clone(), &config);
    Stack { mock, sink, fleet, orchestrator, bringup, symbols }
}

#[tokio::test(start_paused = true)]
async fn test_full_open_and_stop_loss_flow() {
    let stack = build_stack(
        &["BTCUSDT", "ETHUSDT"],
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        vec![],
    )
    .await;
    let (tx, shutdown) = watch::channel(false);

    let report = stack.bringup.run(shutdown.clone()).await;
    assert_eq!(report.started.len(), 2);
    stack.orchestrator.start(&stack.symbols, shutdown.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Touch arrives, blocks form, and past the dwell they become signals.
    stack.mock.emit_price("BTCUSDT", dec!(100), dec!(101));
    tokio::time::sleep(Duration::from_secs(2)).await;
    let ticker = stack.fleet.get("BTCUSDT").expect("indexed");
    assert!(ticker.pending_long().is_some());

    // Ask retraces into the entry band, then bid trades through the stop.
    stack.mock.emit_price("BTCUSDT", dec!(95.4), dec!(95.5));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ticker.open_position().is_some());

    stack.mock.emit_price("BTCUSDT", dec!(94), dec!(94.1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ticker.open_position().is_none());

    let records = stack.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].symbol, "BTCUSDT");
    assert_eq!(records[0].close_reason, CloseReason::StopLoss);
    assert_eq!(records[0].close_price, dec!(94));

    // The other symbol saw nothing and stayed flat.
    let other = stack.fleet.get("ETHUSDT").expect("indexed");
    assert!(other.open_position().is_none());

    tx.send(true).ok();
}

#[tokio::test(start_paused = true)]
async fn test_bringup_reports_failed_symbol() {
    let stack = build_stack(
        &["BTCUSDT"],
        vec!["BTCUSDT".to_string(), "GHOSTUSDT".to_string()],
        vec![],
    )
    .await;
    let (_tx, shutdown) = watch::channel(false);

    let report = stack.bringup.run(shutdown).await;
    assert_eq!(report.started, vec!["BTCUSDT".to_string()]);
    assert_eq!(report.failed, vec!["GHOSTUSDT".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_denylist_removes_symbol_from_universe() {
    let stack = build_stack(
        &["BTCUSDT", "SCAMUSDT"],
        vec!["BTCUSDT".to_string(), "SCAMUSDT".to_string()],
        vec!["SCAMUSDT".to_string()],
    )
    .await;
    assert_eq!(stack.symbols, vec!["BTCUSDT".to_string()]);
    assert!(stack.fleet.get("SCAMUSDT").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_retry_carries_full_batch() {
    let stack = build_stack(
        &["BTCUSDT", "ETHUSDT"],
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        vec![],
    )
    .await;
    let (tx, shutdown) = watch::channel(false);

    // First two subscribe calls (whichever channels get there first) fail;
    // the affected channels retry after the fixed backoff.
    stack.mock.fail_next_subscribes(2);
    stack.orchestrator.start(&stack.symbols, shutdown);
    tokio::time::sleep(Duration::from_secs(12)).await;

    let calls = stack.mock.subscribe_calls();
    assert_eq!(calls.len(), 5, "3 channels + 2 retries");
    for (_, symbols) in &calls {
        assert_eq!(*symbols, stack.symbols, "no symbol dropped on retry");
    }

    tx.send(true).ok();
}

#[tokio::test(start_paused = true)]
async fn test_kline_volume_routes_to_ticker() {
    let stack = build_stack(&["BTCUSDT"], vec!["BTCUSDT".to_string()], vec![]).await;
    let (tx, shutdown) = watch::channel(false);

    stack.bringup.run(shutdown.clone()).await;
    stack.orchestrator.start(&stack.symbols, shutdown);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let ticker = stack.fleet.get("BTCUSDT").expect("indexed");
    let before = ticker.threshold();
    for _ in 0..30 {
        stack.mock.emit_kline("BTCUSDT", dec!(500));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ticker.threshold() > before);

    tx.send(true).ok();
}
