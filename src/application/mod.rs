//! Application layer
//!
//! Process-level orchestration over the domain: the fleet of per-symbol
//! tickers, staged bringup, and stream subscription management.

pub mod bringup;
pub mod fleet;
pub mod subscription;

pub use bringup::{BringupReport, StagedBringupController};
pub use fleet::FleetIndex;
pub use subscription::SubscriptionOrchestrator;
