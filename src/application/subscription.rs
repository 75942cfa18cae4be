//! Stream subscription orchestration
//!
//! Splits the symbol universe into payload-bounded batches and keeps one
//! subscription per (batch, channel) alive: best-price, book-delta and
//! kline-close. A failed or disconnected subscription is retried forever
//! with a fixed backoff until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::application::fleet::FleetIndex;
use crate::config::Config;
use crate::domain::ticker::TickerEvent;
use crate::ports::{MarketDataPort, SubscriptionHandle};

pub struct SubscriptionOrchestrator {
    market_data: Arc<dyn MarketDataPort>,
    fleet: Arc<FleetIndex>,
    batch_max_bytes: usize,
    backoff: Duration,
}

impl SubscriptionOrchestrator {
    pub fn new(
        market_data: Arc<dyn MarketDataPort>,
        fleet: Arc<FleetIndex>,
        config: &Config,
    ) -> Self {
        Self {
            market_data,
            fleet,
            batch_max_bytes: config.subscription.batch_max_bytes,
            backoff: Duration::from_secs(config.subscription.retry_backoff_seconds),
        }
    }

    /// Greedy batching: symbols are appended in order until the JSON
    /// encoding of the batch exceeds the payload budget, at which point the
    /// symbol that tipped it over starts the next batch. A single oversized
    /// symbol still gets a batch of its own.
    pub fn batches(&self, symbols: &[String]) -> Vec<Vec<String>> {
        let mut batches: Vec<Vec<String>> = Vec::new();
        for symbol in symbols {
            match batches.last_mut() {
                Some(batch) => {
                    batch.push(symbol.clone());
                    if encoded_len(batch) > self.batch_max_bytes && batch.len() > 1 {
                        let overflow = batch.pop().unwrap_or_default();
                        batches.push(vec![overflow]);
                    }
                }
                None => batches.push(vec![symbol.clone()]),
            }
        }
        batches
    }

    /// Spawn the long-running subscription tasks, three per batch. Returns
    /// immediately; the tasks run until shutdown is signalled.
    pub fn start(self: &Arc<Self>, symbols: &[String], shutdown: watch::Receiver<bool>) {
        let batches = self.batches(symbols);
        info!(
            symbols = symbols.len(),
            batches = batches.len(),
            "starting market data subscriptions"
        );
        for batch in batches {
            tokio::spawn(Arc::clone(self).price_channel(batch.clone(), shutdown.clone()));
            tokio::spawn(Arc::clone(self).depth_channel(batch.clone(), shutdown.clone()));
            tokio::spawn(Arc::clone(self).kline_channel(batch, shutdown.clone()));
        }
    }

    async fn price_channel(self: Arc<Self>, batch: Vec<String>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let fleet = Arc::clone(&self.fleet);
            let result = self
                .market_data
                .subscribe_best_price(
                    &batch,
                    Arc::new(move |symbol, bid, ask| {
                        fleet.route(symbol, TickerEvent::PriceUpdate { bid, ask });
                    }),
                )
                .await;
            if self.hold_channel("best_price", &batch, result, &mut shutdown).await {
                return;
            }
        }
    }

    async fn depth_channel(self: Arc<Self>, batch: Vec<String>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let fleet = Arc::clone(&self.fleet);
            let result = self
                .market_data
                .subscribe_book_delta(
                    &batch,
                    Arc::new(move |symbol, ask_updates, bid_updates| {
                        fleet.route(symbol, TickerEvent::BookDelta { ask_updates, bid_updates });
                    }),
                )
                .await;
            if self.hold_channel("book_delta", &batch, result, &mut shutdown).await {
                return;
            }
        }
    }

    async fn kline_channel(self: Arc<Self>, batch: Vec<String>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let fleet = Arc::clone(&self.fleet);
            let result = self
                .market_data
                .subscribe_kline_close(
                    &batch,
                    Arc::new(move |symbol, volume| {
                        fleet.route(symbol, TickerEvent::VolumeSample { volume });
                    }),
                )
                .await;
            if self.hold_channel("kline_close", &batch, result, &mut shutdown).await {
                return;
            }
        }
    }

    /// Shared back half of a channel loop: on subscribe failure wait out the
    /// backoff, on success hold until disconnect, then wait out the backoff.
    /// Returns true when the loop should exit for shutdown.
    async fn hold_channel(
        &self,
        channel: &str,
        batch: &[String],
        result: Result<SubscriptionHandle, crate::ports::MarketDataError>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        match result {
            Ok(handle) => {
                info!(channel, symbols = batch.len(), "subscribed");
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return true;
                        }
                    }
                    _ = handle.disconnected() => {
                        warn!(channel, symbols = batch.len(), "subscription dropped, resubscribing");
                    }
                }
            }
            Err(err) => {
                warn!(channel, symbols = batch.len(), %err, "subscribe failed, retrying");
            }
        }
        self.wait_backoff(shutdown).await
    }

    /// Returns true when shutdown fired during the backoff.
    async fn wait_backoff(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => false,
            _ = shutdown.changed() => *shutdown.borrow(),
        }
    }
}

fn encoded_len(batch: &[String]) -> usize {
    serde_json::to_vec(batch).map(|b| b.len()).unwrap_or(usize::MAX)
}
