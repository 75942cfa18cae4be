//! CLI definitions
//!
//! Argument parsing only; command execution lives in `main`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Marlin - order-block liquidity signal engine
#[derive(Parser, Debug)]
#[command(
    name = "marlin",
    version = env!("CARGO_PKG_VERSION"),
    about = "Order-block liquidity signal engine",
    long_about = "Marlin tracks order-book levels whose resting volume clears a \
                  per-symbol volatility threshold, promotes them to signals after \
                  a dwell interval, and manages fixed-risk positions against them."
)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the engine against the simulated feed
    Run(RunCmd),

    /// Load and validate a configuration file
    Validate(ValidateCmd),
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Closed-position audit file
    #[arg(short, long, value_name = "FILE", default_value = "closed_positions.csv")]
    pub output: PathBuf,

    /// Override the number of symbols to trade
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,
}
