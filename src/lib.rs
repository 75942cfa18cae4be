//! Marlin - Order-Block Liquidity Signal Engine
//!
//! Tracks order-book levels whose resting volume clears a per-symbol
//! volatility threshold, promotes them to support/resistance signals after a
//! dwell interval, and manages fixed-risk positions against those signals.
//!
//! # Modules
//!
//! - `domain`: Core logic (OrderBook, OrderBlockRegistry, Position, Ticker)
//! - `ports`: Trait abstractions (MarketDataPort, TopSymbolSelector, ClosedPositionSink)
//! - `application`: Fleet index, staged bringup, subscription orchestration
//! - `adapters`: Simulated feed, CSV sink, CLI
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
