//! Domain Layer - Core engine logic
//!
//! Pure per-symbol trading logic with no exchange dependencies. All external
//! interaction happens through the ports layer.
//!
//! - `order_book`: price-ordered level maps with pruning and best-of-side
//! - `order_block`: candidate registry with dwell promotion scheduling
//! - `volatility`: rolling volume window and threshold derivation
//! - `position`: pending/open positions and the fixed-risk sizing math
//! - `record`: immutable closed-position audit records
//! - `ticker`: the aggregate root and its single-consumer event loop

pub mod order_block;
pub mod order_book;
pub mod position;
pub mod record;
pub mod ticker;
pub mod volatility;

pub use order_block::{OrderBlock, OrderBlockRegistry};
pub use order_book::{BookSide, OrderBook, OrderBookLevel};
pub use position::{CloseReason, OpenPosition, OpenStats, PendingPosition, RiskParams};
pub use record::{BookSnapshot, ClosedPositionRecord};
pub use ticker::{Ticker, TickerError, TickerEvent};
pub use volatility::VolumeWindow;
