//! Hand-rolled port doubles for tests
//!
//! Scripted market data with controllable subscribe failures and
//! disconnects, a recording closed-position sink, and a static symbol
//! selector.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::market_data::{
    DepthCallback, DisconnectNotifier, KlineCallback, MarketDataError, MarketDataPort,
    PriceCallback, PriceVolumePairs, SubscriptionHandle,
};
use super::selector::TopSymbolSelector;
use super::sink::ClosedPositionSink;
use crate::domain::record::ClosedPositionRecord;

#[derive(Default)]
struct SymbolScript {
    tick_size: Option<Decimal>,
    snapshot: Option<(PriceVolumePairs, PriceVolumePairs)>,
    volumes: Vec<Decimal>,
}

/// Scripted market data port.
#[derive(Default)]
pub struct MockMarketData {
    scripts: Mutex<HashMap<String, SymbolScript>>,
    /// Remaining subscribe calls to fail before succeeding.
    subscribe_failures: AtomicUsize,
    subscribe_calls: Mutex<Vec<(String, Vec<String>)>>,
    price_callbacks: Mutex<Vec<PriceCallback>>,
    depth_callbacks: Mutex<Vec<DepthCallback>>,
    kline_callbacks: Mutex<Vec<KlineCallback>>,
    notifiers: Mutex<Vec<DisconnectNotifier>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fully-initializable symbol.
    pub fn with_symbol(
        self,
        symbol: &str,
        tick_size: Decimal,
        asks: PriceVolumePairs,
        bids: PriceVolumePairs,
        volumes: Vec<Decimal>,
    ) -> Self {
        self.scripts.lock().unwrap().insert(
            symbol.to_string(),
            SymbolScript {
                tick_size: Some(tick_size),
                snapshot: Some((asks, bids)),
                volumes,
            },
        );
        self
    }

    /// Fail the next `n` subscribe calls (any channel) before succeeding.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.subscribe_failures.store(n, Ordering::SeqCst);
    }

    /// Recorded subscribe calls as (channel, symbols).
    pub fn subscribe_calls(&self) -> Vec<(String, Vec<String>)> {
        self.subscribe_calls.lock().unwrap().clone()
    }

    /// Push a best-price update into every live price subscription.
    pub fn emit_price(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        for callback in self.price_callbacks.lock().unwrap().iter() {
            callback(symbol, bid, ask);
        }
    }

    /// Push a depth update into every live depth subscription.
    pub fn emit_depth(&self, symbol: &str, asks: PriceVolumePairs, bids: PriceVolumePairs) {
        for callback in self.depth_callbacks.lock().unwrap().iter() {
            callback(symbol, asks.clone(), bids.clone());
        }
    }

    /// Push a closed-kline volume into every live kline subscription.
    pub fn emit_kline(&self, symbol: &str, volume: Decimal) {
        for callback in self.kline_callbacks.lock().unwrap().iter() {
            callback(symbol, volume);
        }
    }

    /// Signal a disconnect on every live subscription.
    pub fn drop_connections(&self) {
        for notifier in self.notifiers.lock().unwrap().drain(..) {
            notifier.notify();
        }
    }

    fn try_consume_failure(&self, channel: &str) -> Result<(), MarketDataError> {
        let mut remaining = self.subscribe_failures.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.subscribe_failures.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Err(MarketDataError::Subscription(format!(
                        "scripted {channel} failure"
                    )))
                }
                Err(actual) => remaining = actual,
            }
        }
        Ok(())
    }

    fn record_call(&self, channel: &str, symbols: &[String]) {
        self.subscribe_calls
            .lock()
            .unwrap()
            .push((channel.to_string(), symbols.to_vec()));
    }

    fn open_handle(&self) -> SubscriptionHandle {
        let (notifier, handle) = SubscriptionHandle::channel();
        self.notifiers.lock().unwrap().push(notifier);
        handle
    }
}

#[async_trait]
impl MarketDataPort for MockMarketData {
    async fn initial_snapshot(
        &self,
        symbol: &str,
        _depth: u32,
    ) -> Result<(PriceVolumePairs, PriceVolumePairs), MarketDataError> {
        self.scripts
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|s| s.snapshot.clone())
            .ok_or_else(|| MarketDataError::NotFound(format!("no snapshot for {symbol}")))
    }

    async fn tick_size(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        self.scripts
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|s| s.tick_size)
            .ok_or_else(|| MarketDataError::NotFound(format!("no price filter for {symbol}")))
    }

    async fn recent_volumes(&self, symbol: &str) -> Result<Vec<Decimal>, MarketDataError> {
        self.scripts
            .lock()
            .unwrap()
            .get(symbol)
            .map(|s| s.volumes.clone())
            .ok_or_else(|| MarketDataError::NotFound(format!("no volumes for {symbol}")))
    }

    async fn subscribe_best_price(
        &self,
        symbols: &[String],
        callback: PriceCallback,
    ) -> Result<SubscriptionHandle, MarketDataError> {
        self.record_call("price", symbols);
        self.try_consume_failure("price")?;
        self.price_callbacks.lock().unwrap().push(callback);
        Ok(self.open_handle())
    }

    async fn subscribe_book_delta(
        &self,
        symbols: &[String],
        callback: DepthCallback,
    ) -> Result<SubscriptionHandle, MarketDataError> {
        self.record_call("depth", symbols);
        self.try_consume_failure("depth")?;
        self.depth_callbacks.lock().unwrap().push(callback);
        Ok(self.open_handle())
    }

    async fn subscribe_kline_close(
        &self,
        symbols: &[String],
        callback: KlineCallback,
    ) -> Result<SubscriptionHandle, MarketDataError> {
        self.record_call("kline", symbols);
        self.try_consume_failure("kline")?;
        self.kline_callbacks.lock().unwrap().push(callback);
        Ok(self.open_handle())
    }
}

/// Sink that stores every record for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<ClosedPositionRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ClosedPositionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ClosedPositionSink for RecordingSink {
    fn log(&self, record: ClosedPositionRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Selector backed by a fixed ranked list.
pub struct StaticSelector {
    ranked: Vec<String>,
    denylist: HashSet<String>,
}

impl StaticSelector {
    pub fn new(ranked: Vec<String>, denylist: Vec<String>) -> Self {
        Self {
            ranked,
            denylist: denylist.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TopSymbolSelector for StaticSelector {
    async fn top_symbols_by_volume(&self, n: usize) -> Result<Vec<String>, MarketDataError> {
        Ok(self
            .ranked
            .iter()
            .filter(|s| !self.denylist.contains(*s))
            .take(n)
            .cloned()
            .collect())
    }
}
