//! Fleet of per-symbol tickers
//!
//! Owns every Ticker instance plus the concurrent symbol lookup the
//! data-fan-in path routes through.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::domain::ticker::{Ticker, TickerEvent};
use crate::ports::{ClosedPositionSink, MarketDataPort};

/// All tickers plus a concurrent symbol index.
pub struct FleetIndex {
    tickers: Vec<Arc<Ticker>>,
    by_symbol: DashMap<String, Arc<Ticker>>,
}

impl FleetIndex {
    /// One ticker per symbol, all sharing the engine config and ports.
    pub fn build(
        symbols: &[String],
        cfg: &EngineConfig,
        market_data: Arc<dyn MarketDataPort>,
        sink: Arc<dyn ClosedPositionSink>,
    ) -> Self {
        let tickers: Vec<Arc<Ticker>> = symbols
            .iter()
            .map(|symbol| {
                Arc::new(Ticker::new(
                    symbol.clone(),
                    cfg.clone(),
                    Arc::clone(&market_data),
                    Arc::clone(&sink),
                ))
            })
            .collect();
        Self::from_tickers(tickers)
    }

    pub fn from_tickers(tickers: Vec<Arc<Ticker>>) -> Self {
        let by_symbol = DashMap::with_capacity(tickers.len());
        for ticker in &tickers {
            by_symbol.insert(ticker.symbol.clone(), Arc::clone(ticker));
        }
        Self { tickers, by_symbol }
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<Ticker>> {
        self.by_symbol.get(symbol).map(|entry| Arc::clone(&entry))
    }

    /// Route an inbound message to its owning ticker's queue. Messages for
    /// unknown symbols (startup races) are dropped silently.
    pub fn route(&self, symbol: &str, event: TickerEvent) -> bool {
        match self.get(symbol) {
            Some(ticker) => ticker.enqueue(event),
            None => false,
        }
    }

    pub fn all(&self) -> &[Arc<Ticker>] {
        &self.tickers
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tickers.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}
