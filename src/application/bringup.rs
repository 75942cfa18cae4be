//! Staged ticker bringup
//!
//! Initializes the fleet in rate-limited batches so a few hundred snapshot
//! and filter fetches do not land on the venue at once. Each ticker gets a
//! bounded number of attempts; the first success starts its event loop,
//! exhaustion marks the symbol failed for the life of the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::application::fleet::FleetIndex;
use crate::config::Config;
use crate::domain::ticker::Ticker;

/// Outcome of a full bringup pass.
#[derive(Debug, Default)]
pub struct BringupReport {
    pub started: Vec<String>,
    pub failed: Vec<String>,
}

pub struct StagedBringupController {
    fleet: Arc<FleetIndex>,
    batch_size: usize,
    max_attempts: u32,
    attempt_delay: Duration,
    batch_cooldown: Duration,
}

impl StagedBringupController {
    pub fn new(fleet: Arc<FleetIndex>, config: &Config) -> Self {
        Self {
            fleet,
            batch_size: config.bringup.batch_size.max(1),
            max_attempts: config.bringup.max_attempts.max(1),
            attempt_delay: Duration::from_secs(config.bringup.attempt_delay_seconds),
            batch_cooldown: Duration::from_secs(config.bringup.batch_cooldown_seconds),
        }
    }

    /// Bring every ticker up, batch by batch. Waits for each batch to settle
    /// (every member started or exhausted) before the cooldown and the next
    /// batch. Returns early on shutdown with whatever was started so far.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> BringupReport {
        let tickers = self.fleet.all().to_vec();
        let batches: Vec<&[Arc<Ticker>]> = tickers.chunks(self.batch_size).collect();
        let total = batches.len();
        let mut report = BringupReport::default();

        for (index, batch) in batches.into_iter().enumerate() {
            if *shutdown.borrow() {
                break;
            }
            info!(batch = index + 1, total, symbols = batch.len(), "bringing up batch");

            let mut set = JoinSet::new();
            for ticker in batch {
                set.spawn(bring_up_one(
                    Arc::clone(ticker),
                    self.max_attempts,
                    self.attempt_delay,
                    shutdown.clone(),
                ));
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Ok(symbol)) => report.started.push(symbol),
                    Ok(Err(symbol)) => report.failed.push(symbol),
                    Err(err) => error!(%err, "bringup task panicked"),
                }
            }

            let last = index + 1 == total;
            if !last && wait_or_shutdown(self.batch_cooldown, &mut shutdown.clone()).await {
                break;
            }
        }

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "bringup complete"
        );
        report
    }
}

/// Initialize one ticker with bounded retries; spawn its event loop on the
/// first success. Err carries the symbol so the report can name it.
async fn bring_up_one(
    ticker: Arc<Ticker>,
    max_attempts: u32,
    attempt_delay: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<String, String> {
    let symbol = ticker.symbol.clone();
    for attempt in 1..=max_attempts {
        if *shutdown.borrow() {
            return Err(symbol);
        }
        match ticker.initialize().await {
            Ok(()) => {
                info!(symbol = %symbol, attempt, "ticker started");
                tokio::spawn(Arc::clone(&ticker).run(shutdown));
                return Ok(symbol);
            }
            Err(err) => {
                warn!(symbol = %symbol, attempt, max_attempts, %err, "ticker init failed");
            }
        }
        if attempt < max_attempts
            && wait_or_shutdown(attempt_delay, &mut shutdown.clone()).await
        {
            return Err(symbol);
        }
    }
    warn!(symbol = %symbol, "ticker bringup exhausted, symbol disabled");
    Err(symbol)
}

/// Returns true when shutdown fired before the delay elapsed.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}
