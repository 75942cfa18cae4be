//! Simulated market data
//!
//! A self-contained `MarketDataPort` for paper runs and demos: every symbol
//! gets a random-walk mid price, a synthetic book around it, and periodic
//! kline volumes. No network, no venue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::ports::{
    DepthCallback, KlineCallback, MarketDataError, MarketDataPort, PriceCallback,
    PriceVolumePairs, SubscriptionHandle,
};

const VOLUME_HISTORY: usize = 1440;

pub struct SimulatedMarketData {
    tick_size: Decimal,
    interval: Duration,
    mids: Arc<Mutex<HashMap<String, Decimal>>>,
}

impl SimulatedMarketData {
    pub fn new(tick_size: Decimal, interval: Duration) -> Self {
        Self {
            tick_size,
            interval,
            mids: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Mid price for a symbol, seeded on first use.
    fn mid(&self, symbol: &str) -> Decimal {
        let mut mids = self.mids.lock().unwrap();
        *mids
            .entry(symbol.to_string())
            .or_insert_with(|| Decimal::from(rand::thread_rng().gen_range(10..1000u32)))
    }

    /// Step a symbol's mid by a few ticks and return the new value.
    fn step_mid(
        mids: &Mutex<HashMap<String, Decimal>>,
        tick_size: Decimal,
        symbol: &str,
        rng: &mut StdRng,
    ) -> Decimal {
        let step = Decimal::from(rng.gen_range(-3..=3i64)) * tick_size;
        let mut mids = mids.lock().unwrap();
        let mid = mids.entry(symbol.to_string()).or_insert(dec!(100));
        *mid = (*mid + step).max(tick_size * dec!(10));
        *mid
    }

    fn synthetic_book(&self, mid: Decimal, depth: u32) -> (PriceVolumePairs, PriceVolumePairs) {
        let mut rng = rand::thread_rng();
        let mut asks = Vec::with_capacity(depth as usize);
        let mut bids = Vec::with_capacity(depth as usize);
        for i in 1..=depth as i64 {
            let offset = Decimal::from(i) * self.tick_size;
            let volume = Decimal::from(rng.gen_range(1..=100u32));
            asks.push((mid + offset, volume));
            let volume = Decimal::from(rng.gen_range(1..=100u32));
            bids.push((mid - offset, volume));
        }
        (asks, bids)
    }
}

#[async_trait]
impl MarketDataPort for SimulatedMarketData {
    async fn initial_snapshot(
        &self,
        symbol: &str,
        depth: u32,
    ) -> Result<(PriceVolumePairs, PriceVolumePairs), MarketDataError> {
        let mid = self.mid(symbol);
        Ok(self.synthetic_book(mid, depth))
    }

    async fn tick_size(&self, _symbol: &str) -> Result<Decimal, MarketDataError> {
        Ok(self.tick_size)
    }

    async fn recent_volumes(&self, _symbol: &str) -> Result<Vec<Decimal>, MarketDataError> {
        let mut rng = rand::thread_rng();
        Ok((0..VOLUME_HISTORY)
            .map(|_| Decimal::from(rng.gen_range(50..=150u32)))
            .collect())
    }

    async fn subscribe_best_price(
        &self,
        symbols: &[String],
        callback: PriceCallback,
    ) -> Result<SubscriptionHandle, MarketDataError> {
        let (notifier, handle) = SubscriptionHandle::channel();
        debug!(symbols = symbols.len(), "simulated best-price feed started");
        let symbols = symbols.to_vec();
        let mids = Arc::clone(&self.mids);
        let tick_size = self.tick_size;
        let interval = self.interval;
        tokio::spawn(async move {
            let _notifier = notifier;
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for symbol in &symbols {
                    let mid = Self::step_mid(&mids, tick_size, symbol, &mut rng);
                    callback(symbol, mid - tick_size, mid + tick_size);
                }
            }
        });
        Ok(handle)
    }

    async fn subscribe_book_delta(
        &self,
        symbols: &[String],
        callback: DepthCallback,
    ) -> Result<SubscriptionHandle, MarketDataError> {
        let (notifier, handle) = SubscriptionHandle::channel();
        let symbols = symbols.to_vec();
        let mids = Arc::clone(&self.mids);
        let tick_size = self.tick_size;
        let interval = self.interval;
        tokio::spawn(async move {
            let _notifier = notifier;
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for symbol in &symbols {
                    let mid = { *mids.lock().unwrap().entry(symbol.clone()).or_insert(dec!(100)) };
                    let offset = Decimal::from(rng.gen_range(1..=20i64)) * tick_size;
                    let ask_volume = Decimal::from(rng.gen_range(0..=200u32));
                    let bid_volume = Decimal::from(rng.gen_range(0..=200u32));
                    callback(
                        symbol,
                        vec![(mid + offset, ask_volume)],
                        vec![(mid - offset, bid_volume)],
                    );
                }
            }
        });
        Ok(handle)
    }

    async fn subscribe_kline_close(
        &self,
        symbols: &[String],
        callback: KlineCallback,
    ) -> Result<SubscriptionHandle, MarketDataError> {
        let (notifier, handle) = SubscriptionHandle::channel();
        let symbols = symbols.to_vec();
        let interval = self.interval;
        tokio::spawn(async move {
            let _notifier = notifier;
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for symbol in &symbols {
                    callback(symbol, Decimal::from(rng.gen_range(50..=150u32)));
                }
            }
        });
        Ok(handle)
    }
}

/// Synthetic symbol universe for paper runs. Hands out `SIM000USDT`,
/// `SIM001USDT`, ... minus the injected denylist.
pub struct SimulatedUniverse {
    denylist: std::collections::HashSet<String>,
}

impl SimulatedUniverse {
    pub fn new(denylist: Vec<String>) -> Self {
        Self {
            denylist: denylist.into_iter().collect(),
        }
    }
}

#[async_trait]
impl crate::ports::TopSymbolSelector for SimulatedUniverse {
    async fn top_symbols_by_volume(&self, n: usize) -> Result<Vec<String>, MarketDataError> {
        Ok((0..)
            .map(|i| format!("SIM{i:03}USDT"))
            .filter(|s| !self.denylist.contains(s))
            .take(n)
            .collect())
    }
}
