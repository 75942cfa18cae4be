//! Market data port
//!
//! Trait seam to the exchange connectivity layer: REST-style fetches used
//! during ticker bringup, and the three streaming channels the subscription
//! orchestrator consumes. Implementations live in adapters; the core only
//! sees this trait.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::oneshot;

/// Market data error type
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Data parsing error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// (price, volume) pairs for one side of the book.
pub type PriceVolumePairs = Vec<(Decimal, Decimal)>;

/// Best bid/ask update callback: (symbol, bid, ask).
pub type PriceCallback = Arc<dyn Fn(&str, Decimal, Decimal) + Send + Sync>;

/// Incremental depth update callback: (symbol, ask updates, bid updates).
pub type DepthCallback = Arc<dyn Fn(&str, PriceVolumePairs, PriceVolumePairs) + Send + Sync>;

/// Closed-kline volume callback: (symbol, volume).
pub type KlineCallback = Arc<dyn Fn(&str, Decimal) + Send + Sync>;

/// Live subscription handle. Resolves when the underlying stream drops, so
/// the orchestrator can resubscribe.
pub struct SubscriptionHandle {
    disconnected: oneshot::Receiver<()>,
}

impl SubscriptionHandle {
    /// Paired notifier/handle. The adapter keeps the notifier; firing it (or
    /// dropping it) signals a disconnect.
    pub fn channel() -> (DisconnectNotifier, SubscriptionHandle) {
        let (tx, rx) = oneshot::channel();
        (
            DisconnectNotifier { tx: Some(tx) },
            SubscriptionHandle { disconnected: rx },
        )
    }

    /// Waits until the stream disconnects.
    pub async fn disconnected(self) {
        // A dropped notifier counts as a disconnect too.
        let _ = self.disconnected.await;
    }
}

/// Adapter-side end of a subscription's disconnect signal.
pub struct DisconnectNotifier {
    tx: Option<oneshot::Sender<()>>,
}

impl DisconnectNotifier {
    pub fn notify(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Market data port trait
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fresh order-book snapshot: (asks, bids) price/volume pairs.
    async fn initial_snapshot(
        &self,
        symbol: &str,
        depth: u32,
    ) -> Result<(PriceVolumePairs, PriceVolumePairs), MarketDataError>;

    /// Minimum price increment for the symbol. `NotFound` when the symbol
    /// or its price filter is unknown.
    async fn tick_size(&self, symbol: &str) -> Result<Decimal, MarketDataError>;

    /// Recent kline volumes, oldest first.
    async fn recent_volumes(&self, symbol: &str) -> Result<Vec<Decimal>, MarketDataError>;

    /// Subscribe to best bid/ask updates for a batch of symbols.
    async fn subscribe_best_price(
        &self,
        symbols: &[String],
        callback: PriceCallback,
    ) -> Result<SubscriptionHandle, MarketDataError>;

    /// Subscribe to incremental book depth updates for a batch of symbols.
    async fn subscribe_book_delta(
        &self,
        symbols: &[String],
        callback: DepthCallback,
    ) -> Result<SubscriptionHandle, MarketDataError>;

    /// Subscribe to closed-kline volume updates for a batch of symbols.
    async fn subscribe_kline_close(
        &self,
        symbols: &[String],
        callback: KlineCallback,
    ) -> Result<SubscriptionHandle, MarketDataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_resolves_on_notify() {
        let (notifier, handle) = SubscriptionHandle::channel();
        notifier.notify();
        handle.disconnected().await;
    }

    #[tokio::test]
    async fn test_handle_resolves_on_dropped_notifier() {
        let (notifier, handle) = SubscriptionHandle::channel();
        drop(notifier);
        handle.disconnected().await;
    }
}
