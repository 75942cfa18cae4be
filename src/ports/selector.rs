//! Symbol universe selection

use async_trait::async_trait;

use super::market_data::MarketDataError;

/// Ranks the tradable universe by exchange-wide recent quote volume,
/// excluding a configured denylist. Implementations own the denylist; it is
/// injected at construction, not read from process-wide state.
#[async_trait]
pub trait TopSymbolSelector: Send + Sync {
    async fn top_symbols_by_volume(&self, n: usize) -> Result<Vec<String>, MarketDataError>;
}
