//! Configuration loading
//!
//! Settings come from an optional TOML file merged with environment
//! overrides:
//! - `DATABASE_URL` always wins for `[database].url` (matches the `.env`
//!   convention the reports have historically used)
//! - `TRADESCOPE__`-prefixed variables override anything else, with `__`
//!   separating both the prefix and the nesting levels
//!   (e.g. `TRADESCOPE__ANALYSIS__FOCUS_CITY`)

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Store connection settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Postgres connection string; `DATABASE_URL` overrides this
    #[serde(default)]
    pub url: String,
}

/// Knobs for the two report pipelines
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Platform filter applied to the opportunities query
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Trade statuses considered settled for the peak-exit cohort
    #[serde(default = "default_trade_statuses")]
    pub trade_statuses: Vec<String>,
    /// Time cutoff for the win-predictor train/eval split (UTC)
    #[serde(default = "default_split_date")]
    pub split_date: DateTime<Utc>,
    /// City singled out in the isolation cross-tabs
    #[serde(default = "default_focus_city")]
    pub focus_city: String,
    /// Minimum usable rows before a classifier is fitted
    #[serde(default = "default_min_train_samples")]
    pub min_train_samples: usize,
    /// Where the eval-set predictions CSV is written
    #[serde(default = "default_predictions_path")]
    pub predictions_path: String,
}

fn default_platform() -> String {
    "polymarket".to_string()
}

fn default_trade_statuses() -> Vec<String> {
    vec!["resolved".to_string(), "exited".to_string()]
}

fn default_split_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap()
}

fn default_focus_city() -> String {
    "seoul".to_string()
}

fn default_min_train_samples() -> usize {
    5
}

fn default_predictions_path() -> String {
    "ml_predictions_test.csv".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            trade_statuses: default_trade_statuses(),
            split_date: default_split_date(),
            focus_city: default_focus_city(),
            min_train_samples: default_min_train_samples(),
            predictions_path: default_predictions_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus the environment.
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = shellexpand::tilde(path).into_owned();
        let mut cfg: AppConfig = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("TRADESCOPE").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }
        if cfg.database.url.is_empty() {
            return Err(AppError::Config(
                "no database url: set DATABASE_URL or [database].url in the config file".into(),
            ));
        }

        Ok(cfg)
    }

    /// Predictions path with `~` expanded.
    pub fn predictions_path(&self) -> String {
        shellexpand::tilde(&self.analysis.predictions_path).into_owned()
    }
}
