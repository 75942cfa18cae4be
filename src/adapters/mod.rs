//! Adapters
//!
//! Concrete implementations of the ports: a simulated market-data feed for
//! paper runs and a CSV sink for closed-position audit records. Live
//! exchange connectivity plugs in behind the same traits.

pub mod cli;
pub mod csv_sink;
pub mod sim;

pub use csv_sink::CsvPositionSink;
pub use sim::{SimulatedMarketData, SimulatedUniverse};
