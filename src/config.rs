//! Engine configuration
//!
//! Strategy parameters, market inputs and live-loop settings, loaded from a
//! TOML file. Every section and field is optional.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::live::DEFAULT_POLL_INTERVAL;
use crate::models::{BacktestConfig, RateQuote};

pub const CONFIG_PATH_ENV: &str = "FXARB_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fxarb.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub strategy: BacktestConfig,

    #[serde(default)]
    pub market: MarketConfig,

    #[serde(default)]
    pub live: LiveConfig,
}

/// Pair and money-market rates used to build quotes from a bare spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Broker instrument name, e.g. `EUR_USD`
    #[serde(default = "default_pair")]
    pub pair: String,

    /// Domestic (quote currency) rate, annualised decimal
    #[serde(default = "default_r_dom")]
    pub r_dom: f64,

    /// Foreign (base currency) rate, annualised decimal
    #[serde(default = "default_r_for")]
    pub r_for: f64,
}

fn default_pair() -> String {
    "EUR_USD".to_string()
}

fn default_r_dom() -> f64 {
    0.025
}

fn default_r_for() -> f64 {
    0.005
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            pair: default_pair(),
            r_dom: default_r_dom(),
            r_for: default_r_for(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl EngineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.strategy.validate()?;
        Ok(config)
    }

    /// Load from `FXARB_CONFIG` or the default path, falling back to defaults
    pub fn from_env() -> Self {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default engine config ({}): {:#}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Quote for `spot` at the configured rates and tenor.
    pub fn quote(&self, spot: f64) -> RateQuote {
        RateQuote::new(
            spot,
            self.strategy.tenor_days,
            self.market.r_dom,
            self.market.r_for,
        )
    }
}
