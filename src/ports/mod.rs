//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) the core consumes. Following
//! hexagonal architecture, these traits abstract:
//! - Market data (REST-style bringup fetches + the three streaming channels)
//! - Symbol universe selection
//! - Closed-position persistence

pub mod market_data;
pub mod mocks;
pub mod selector;
pub mod sink;

pub use market_data::{
    DepthCallback, DisconnectNotifier, KlineCallback, MarketDataError, MarketDataPort,
    PriceCallback, PriceVolumePairs, SubscriptionHandle,
};
pub use selector::TopSymbolSelector;
pub use sink::ClosedPositionSink;
