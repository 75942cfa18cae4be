//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml
//! structure. Every section has defaults taken from the production setup, so
//! a partial file only overrides what it names.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::position::RiskParams;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signals: SignalsSection,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub universe: UniverseSection,
    #[serde(default)]
    pub subscription: SubscriptionSection,
    #[serde(default)]
    pub bringup: BringupSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Signal detection section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsSection {
    /// Seconds a candidate block must dwell before promotion to signal
    pub dwell_seconds: u64,
    /// Retained volume samples (5 days of 5m klines)
    pub volume_window: usize,
    /// Order book snapshot depth fetched at bringup
    pub snapshot_depth: u32,
}

impl Default for SignalsSection {
    fn default() -> Self {
        Self {
            dwell_seconds: 120,
            volume_window: 1440,
            snapshot_depth: 1000,
        }
    }
}

/// Risk management section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    /// Maximum net loss per trade in quote currency
    pub max_loss: Decimal,
    /// Total available capital, caps position size
    pub capital: Decimal,
    /// Commission percent per side (0.05 = 0.05%)
    pub commission_pct: Decimal,
    /// Profit:loss asymmetry used to solve the take-profit
    pub profit_ratio: Decimal,
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            max_loss: dec!(5),
            capital: dec!(10000),
            commission_pct: dec!(0.05),
            profit_ratio: dec!(20),
        }
    }
}

/// Symbol universe section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UniverseSection {
    /// How many top-volume symbols to trade
    pub top_n: usize,
    /// Symbols excluded from selection
    #[serde(default)]
    pub denylist: Vec<String>,
}

impl Default for UniverseSection {
    fn default() -> Self {
        Self {
            top_n: 300,
            denylist: Vec::new(),
        }
    }
}

/// Stream subscription section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionSection {
    /// Serialized batch size budget in bytes
    pub batch_max_bytes: usize,
    /// Fixed backoff between failed subscribe attempts
    pub retry_backoff_seconds: u64,
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            batch_max_bytes: 1000,
            retry_backoff_seconds: 5,
        }
    }
}

/// Staged bringup section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BringupSection {
    /// Tickers initialized concurrently per batch
    pub batch_size: usize,
    /// Initialize attempts per ticker before it is marked failed
    pub max_attempts: u32,
    /// Delay between attempts for one ticker
    pub attempt_delay_seconds: u64,
    /// Rate-limit cooldown between batches
    pub batch_cooldown_seconds: u64,
}

impl Default for BringupSection {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 5,
            attempt_delay_seconds: 5,
            batch_cooldown_seconds: 75,
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signals.dwell_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "dwell_seconds must be > 0".to_string(),
            ));
        }
        if self.signals.volume_window == 0 {
            return Err(ConfigError::ValidationError(
                "volume_window must be > 0".to_string(),
            ));
        }
        if self.risk.max_loss <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "max_loss must be > 0, got {}",
                self.risk.max_loss
            )));
        }
        if self.risk.capital <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "capital must be > 0, got {}",
                self.risk.capital
            )));
        }
        if self.risk.commission_pct < Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "commission_pct must be >= 0, got {}",
                self.risk.commission_pct
            )));
        }
        if self.risk.profit_ratio <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "profit_ratio must be > 0, got {}",
                self.risk.profit_ratio
            )));
        }
        if self.universe.top_n == 0 {
            return Err(ConfigError::ValidationError(
                "top_n must be > 0".to_string(),
            ));
        }
        if self.subscription.batch_max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "batch_max_bytes must be > 0".to_string(),
            ));
        }
        if self.bringup.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.bringup.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Flattened view consumed by the per-symbol engine.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            dwell: Duration::from_secs(self.signals.dwell_seconds),
            volume_window: self.signals.volume_window,
            snapshot_depth: self.signals.snapshot_depth,
            risk: RiskParams {
                max_loss: self.risk.max_loss,
                capital: self.risk.capital,
                commission_pct: self.risk.commission_pct,
                profit_ratio: self.risk.profit_ratio,
            },
        }
    }
}

/// Engine parameters shared by every ticker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dwell: Duration,
    pub volume_window: usize,
    pub snapshot_depth: u32,
    pub risk: RiskParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Config::default().engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.signals.dwell_seconds, 120);
        assert_eq!(config.signals.volume_window, 1440);
        assert_eq!(config.risk.max_loss, dec!(5));
        assert_eq!(config.bringup.batch_size, 50);
    }

    #[test]
    fn test_parse_partial_file_overrides() {
        let toml = r#"
            [risk]
            max_loss = 10
            capital = 50000
            commission_pct = 0.1
            profit_ratio = 15

            [universe]
            top_n = 20
            denylist = ["USDCUSDT", "FDUSDUSDT"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk.max_loss, dec!(10));
        assert_eq!(config.universe.top_n, 20);
        assert_eq!(config.universe.denylist.len(), 2);
        // Untouched sections fall back to defaults.
        assert_eq!(config.signals.dwell_seconds, 120);
    }

    #[test]
    fn test_invalid_max_loss_rejected() {
        let toml = r#"
            [risk]
            max_loss = 0
            capital = 10000
            commission_pct = 0.05
            profit_ratio = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_dwell_rejected() {
        let toml = r#"
            [signals]
            dwell_seconds = 0
            volume_window = 1440
            snapshot_depth = 1000
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_view() {
        let engine = Config::default().engine();
        assert_eq!(engine.dwell, Duration::from_secs(120));
        assert_eq!(engine.volume_window, 1440);
        assert_eq!(engine.risk.profit_ratio, dec!(20));
    }
}
