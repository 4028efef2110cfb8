//! Feature engineering for the two classifiers
//!
//! Turns loaded rows into dense `f64` matrices:
//! - categorical encodings (range type, side, city)
//! - calendar features extracted in UTC
//! - interaction terms
//! - null policy: a row missing any feature is dropped, never imputed

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{OpportunityRow, TradeRow};

/// Win-predictor features, in model column order.
pub const WIN_FEATURES: [&str; 14] = [
    "ask",
    "bid",
    "spread",
    "our_probability",
    "ensemble_std_dev",
    "hours_to_resolution",
    "range_width",
    "range_type_enc",
    "side_enc",
    "city_enc",
    "month",
    "hour_of_day",
    "ask_x_hours",
    "prob_minus_ask",
];

/// Peak-exit features, in model column order. All known at entry time.
pub const EXIT_FEATURES: [&str; 9] = [
    "entry_ask",
    "entry_probability",
    "entry_edge_pct",
    "entry_spread",
    "cost",
    "range_type_enc",
    "side_enc",
    "city_enc",
    "hours_to_resolution",
];

/// Dense training matrix plus the source index of every surviving row.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<&'static str>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    /// Index into the source slice for each kept row
    pub kept: Vec<usize>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One named column as a vector, aligned with `targets` and `kept`.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.names.iter().position(|n| *n == name)?;
        Some(self.rows.iter().map(|r| r[i]).collect())
    }
}

/// Assigns integer codes to cities in first-seen order.
///
/// Codes are batch-relative: fitting twice over the same batch yields the
/// same mapping, but codes are not comparable across different batches.
#[derive(Debug, Clone)]
pub struct CityEncoder {
    codes: HashMap<String, usize>,
    order: Vec<String>,
}

impl CityEncoder {
    pub fn fit<'a, I>(cities: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut codes = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for city in cities {
            if !codes.contains_key(city) {
                codes.insert(city.to_string(), order.len());
                order.push(city.to_string());
            }
        }
        Self { codes, order }
    }

    pub fn code(&self, city: &str) -> Option<usize> {
        self.codes.get(city).copied()
    }

    pub fn contains(&self, city: &str) -> bool {
        self.codes.contains_key(city)
    }

    /// `(city, code)` pairs in code order, for the report's city listing.
    pub fn mapping(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.order.iter().enumerate().map(|(i, c)| (c.as_str(), i))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub fn encode_range_type(range_type: &str) -> f64 {
    if range_type == "unbounded" {
        1.0
    } else {
        0.0
    }
}

pub fn encode_side(side: &str) -> f64 {
    if side == "YES" {
        1.0
    } else {
        0.0
    }
}

/// Strict time split on `created_at`: rows before the cutoff train, the
/// rest evaluate. No shuffling.
pub fn split_by_time(
    rows: &[OpportunityRow],
    cutoff: DateTime<Utc>,
) -> (Vec<OpportunityRow>, Vec<OpportunityRow>) {
    let mut train = Vec::new();
    let mut eval = Vec::new();
    for row in rows {
        if row.created_at < cutoff {
            train.push(row.clone());
        } else {
            eval.push(row.clone());
        }
    }
    (train, eval)
}

/// Build the win-predictor matrix. The encoder must already be fitted over
/// the full batch so train and eval share one city mapping.
pub fn win_features(rows: &[OpportunityRow], encoder: &CityEncoder) -> FeatureMatrix {
    let mut matrix = FeatureMatrix {
        names: WIN_FEATURES.to_vec(),
        rows: Vec::new(),
        targets: Vec::new(),
        kept: Vec::new(),
    };

    for (idx, row) in rows.iter().enumerate() {
        let ask = dec(row.ask);
        let hours = opt(row.hours_to_resolution);
        let prob = dec(row.our_probability);
        let values = [
            ask,
            opt(row.bid),
            opt(row.spread),
            prob,
            opt(row.ensemble_std_dev),
            hours,
            opt(row.range_width),
            Some(encode_range_type(&row.range_type)),
            Some(encode_side(&row.side)),
            encoder.code(&row.city).map(|c| c as f64),
            Some(row.created_at.month() as f64),
            Some(row.created_at.hour() as f64),
            ask.zip(hours).map(|(a, h)| a * h),
            prob.zip(ask).map(|(p, a)| p - a),
        ];
        if let Some(dense) = dense_row(&values) {
            matrix.rows.push(dense);
            matrix.targets.push(row.target());
            matrix.kept.push(idx);
        }
    }
    matrix
}

/// Build the peak-exit matrix from the cohort trades and their precomputed
/// 0/1 targets (aligned by index).
pub fn exit_features(trades: &[&TradeRow], targets: &[f64], encoder: &CityEncoder) -> FeatureMatrix {
    debug_assert_eq!(trades.len(), targets.len());

    let mut matrix = FeatureMatrix {
        names: EXIT_FEATURES.to_vec(),
        rows: Vec::new(),
        targets: Vec::new(),
        kept: Vec::new(),
    };

    for (idx, (trade, &target)) in trades.iter().zip(targets).enumerate() {
        let values = [
            dec(trade.entry_ask),
            opt(trade.entry_probability),
            opt(trade.entry_edge_pct),
            opt(trade.entry_spread),
            opt(trade.cost),
            Some(encode_range_type(&trade.range_type)),
            Some(encode_side(&trade.side)),
            encoder.code(&trade.city).map(|c| c as f64),
            opt(trade.hours_to_resolution),
        ];
        if let Some(dense) = dense_row(&values) {
            matrix.rows.push(dense);
            matrix.targets.push(target);
            matrix.kept.push(idx);
        }
    }
    matrix
}

fn dec(value: Decimal) -> Option<f64> {
    value.to_f64()
}

fn opt(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

fn dense_row(values: &[Option<f64>]) -> Option<Vec<f64>> {
    values.iter().copied().collect()
}
