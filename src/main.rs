//! Marlin - Order-Block Liquidity Signal Engine

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal_macros::dec;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use marlin::adapters::cli::{CliApp, Command, RunCmd, ValidateCmd};
use marlin::adapters::{CsvPositionSink, SimulatedMarketData, SimulatedUniverse};
use marlin::application::{FleetIndex, StagedBringupController, SubscriptionOrchestrator};
use marlin::config::{load_config, Config};
use marlin::ports::{ClosedPositionSink, MarketDataPort, TopSymbolSelector};

#[tokio::main]
async fn main() -> Result<()> {
    // .env holds venue credentials when a live adapter is wired in
    dotenvy::dotenv().ok();

    let app = CliApp::parse();

    match app.command {
        Command::Run(cmd) => run_command(cmd, app.verbose, app.debug).await,
        Command::Validate(cmd) => validate_command(cmd, app.verbose, app.debug).await,
    }
}

/// Flags win over the config file; the config file wins over the default.
fn init_logging(verbose: bool, debug: bool, config_level: &str) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_new(config_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run_command(cmd: RunCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_config(&cmd.config).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_logging(verbose, debug, &config.logging.level)?;

    info!(config = %cmd.config.display(), "starting marlin");

    let top_n = cmd.top.unwrap_or(config.universe.top_n);
    let market_data: Arc<dyn MarketDataPort> =
        Arc::new(SimulatedMarketData::new(dec!(0.01), Duration::from_millis(250)));
    let selector = SimulatedUniverse::new(config.universe.denylist.clone());
    let sink: Arc<dyn ClosedPositionSink> = Arc::new(
        CsvPositionSink::open(&cmd.output).context("failed to open closed-position file")?,
    );

    let symbols = selector
        .top_symbols_by_volume(top_n)
        .await
        .context("failed to select symbol universe")?;
    info!(symbols = symbols.len(), "symbol universe selected");

    let engine = config.engine();
    let fleet = Arc::new(FleetIndex::build(
        &symbols,
        &engine,
        Arc::clone(&market_data),
        sink,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    // Streams first; events for not-yet-started tickers queue on their
    // channels and drain once the loops come up.
    let orchestrator = Arc::new(SubscriptionOrchestrator::new(
        Arc::clone(&market_data),
        Arc::clone(&fleet),
        &config,
    ));
    orchestrator.start(&symbols, shutdown_rx.clone());

    let bringup = StagedBringupController::new(Arc::clone(&fleet), &config);
    let report = bringup.run(shutdown_rx.clone()).await;
    if !report.failed.is_empty() {
        error!(failed = ?report.failed, "some symbols failed bringup");
    }
    info!(
        started = report.started.len(),
        failed = report.failed.len(),
        "engine running"
    );

    wait_for_shutdown(shutdown_rx).await;
    info!("shutdown complete");
    Ok(())
}

async fn validate_command(cmd: ValidateCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_config(&cmd.config).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_logging(verbose, debug, &config.logging.level)?;
    print_summary(&config);
    Ok(())
}

fn print_summary(config: &Config) {
    println!("configuration OK");
    println!("  universe:     top {} (denylist {})", config.universe.top_n, config.universe.denylist.len());
    println!("  dwell:        {}s", config.signals.dwell_seconds);
    println!("  max loss:     {}", config.risk.max_loss);
    println!("  capital:      {}", config.risk.capital);
    println!(
        "  bringup:      batches of {}, {} attempts",
        config.bringup.batch_size, config.bringup.max_attempts
    );
}

fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}
