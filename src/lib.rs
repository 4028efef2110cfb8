//! Offline ML reports over the weather-market trading database.
//!
//! Two report pipelines share one stack:
//!
//! ```text
//! PostgreSQL → Loader → Features → Time Split → GBDT → Metrics → Report/CSV
//! ```
//!
//! `report::win` trains an opportunity-level win classifier on a strict
//! time split and audits it against the production probability;
//! `report::peak_exit` studies how far losing trades ran past their entry
//! before settling. Both are read-only: nothing here writes back to the
//! database.

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod report;
pub mod types;
pub mod window;

#[cfg(test)]
mod config_tests;
