use crate::model::{PriceFrequency, StatementFrequency};
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerConfig {
    pub symbol: String,
    #[serde(default = "default_frequencies")]
    pub frequencies: Vec<StatementFrequency>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub draws: usize,
    pub seed: u64,
    pub alpha: f64,
    pub timeout_seconds: u64,
    pub workers: usize,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            draws: 1000,
            seed: 42,
            alpha: 0.05,
            timeout_seconds: 120,
            workers: 4,
        }
    }
}

impl ImpactConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tickers: Vec<TickerConfig>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub upload_to_database: bool,
    #[serde(default = "default_history_years")]
    pub history_years: u32,
    #[serde(default)]
    pub price_frequency: PriceFrequency,
    #[serde(default)]
    pub impact: ImpactConfig,
    /// Ignore cached statements and prices and fetch again.
    #[serde(default)]
    pub refresh: bool,
}

fn default_frequencies() -> Vec<StatementFrequency> {
    vec![StatementFrequency::Annual, StatementFrequency::Quarterly]
}

fn default_cache_dir() -> String {
    "./cached".into()
}

fn default_database_path() -> String {
    "swiftgrasp.db".into()
}

fn default_history_years() -> u32 {
    3
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.tickers.iter().find(|t| t.symbol.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("empty ticker symbol: {:?}", t.symbol)));
        }
        let alpha = self.impact.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::Invalid(format!("impact.alpha must be in (0, 1), got {}", alpha)));
        }
        if self.impact.draws == 0 {
            return Err(ConfigError::Invalid("impact.draws must be positive".into()));
        }
        if self.impact.workers == 0 {
            return Err(ConfigError::Invalid("impact.workers must be positive".into()));
        }
        if self.impact.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("impact.timeout_seconds must be positive".into()));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
