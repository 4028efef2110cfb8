//! Row types loaded from the store
//!
//! Monetary and price columns are NUMERIC in Postgres and stay `Decimal`
//! here; conversion to `f64` happens only when feature matrices are built.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// One settled losing trade (peak-exit cohort).
///
/// The query guarantees `entry_ask > 0`, `max_price_seen` and `pnl`
/// non-null; everything else may be absent.
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub id: i64,
    pub city: String,
    pub range_name: String,
    pub range_type: String,
    pub range_unit: Option<String>,
    pub side: String,
    pub entry_ask: Decimal,
    pub entry_bid: Option<Decimal>,
    pub entry_spread: Option<Decimal>,
    pub entry_probability: Option<Decimal>,
    pub entry_edge_pct: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub shares: Option<Decimal>,
    pub max_price_seen: Decimal,
    pub pnl: Decimal,
    pub status: String,
    pub entry_reason: Option<String>,
    pub hours_to_resolution: Option<Decimal>,
    /// Raw JSONB evaluation history; parsed lazily by the window analyzer
    pub evaluator_log: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// One resolved opportunity with a known outcome (win-predictor input).
#[derive(Debug, Clone)]
pub struct OpportunityRow {
    pub city: String,
    pub range_type: String,
    pub side: String,
    pub ask: Decimal,
    pub bid: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub our_probability: Decimal,
    pub ensemble_std_dev: Option<Decimal>,
    pub hours_to_resolution: Option<Decimal>,
    pub range_width: Option<Decimal>,
    pub would_have_won: bool,
    pub created_at: DateTime<Utc>,
}

impl OpportunityRow {
    /// Outcome as a 0/1 training target.
    pub fn target(&self) -> f64 {
        if self.would_have_won {
            1.0
        } else {
            0.0
        }
    }
}
