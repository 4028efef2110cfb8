//! Losing-trade exit window report.
//!
//! Part A describes the cohort: how many losers ran past 1.5x and 2x of
//! the entry price before settling, what a take-profit at those levels
//! would have recovered, and how long the sell window stayed open. Part B
//! trains a small classifier over entry-time features to see which
//! entries tend to offer an exit window at all.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::Result;
use crate::features::{self, CityEncoder};
use crate::metrics;
use crate::model::{GbdtClassifier, GbdtParams, ModelError};
use crate::report::{banner, section, Table};
use crate::types::TradeRow;
use crate::window;

/// Peak metrics derived from one losing trade.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakStats {
    pub peak_multiple: Decimal,
    pub hit_15x: bool,
    pub hit_2x: bool,
}

impl PeakStats {
    /// `None` when the entry price cannot serve as a divisor.
    pub fn compute(trade: &TradeRow) -> Option<Self> {
        if trade.entry_ask <= Decimal::ZERO {
            return None;
        }
        let peak_multiple = trade.max_price_seen / trade.entry_ask;
        Some(Self {
            peak_multiple,
            hit_15x: peak_multiple >= dec!(1.5),
            hit_2x: peak_multiple >= dec!(2.0),
        })
    }
}

/// Duration detail for one trade whose peak cleared the take-profit level.
struct WindowRow<'a> {
    trade: &'a TradeRow,
    stats: &'a PeakStats,
    window_minutes: f64,
}

pub async fn run(config: &AppConfig) -> Result<()> {
    banner("ML PEAK EXIT ANALYSIS - Losing Trade Exit Windows");

    println!("\n[1] Loading losing trades from PostgreSQL...");
    let db = Database::connect(&config.database.url).await?;
    let trades = db.fetch_losing_trades(&config.analysis).await?;
    db.close().await;

    let cohort: Vec<(TradeRow, PeakStats)> = trades
        .into_iter()
        .filter_map(|t| PeakStats::compute(&t).map(|s| (t, s)))
        .collect();
    println!("    Loaded {} losing trades", cohort.len());

    section("PART A - DESCRIPTIVE STATS");
    print_headline_counts(&cohort);
    print_recovery(&cohort);
    print_reason_breakdown(&cohort);
    print_range_side_breakdown(&cohort);
    let durations = window_durations(&cohort);
    print_duration_stats(&durations);
    print_detail(&cohort);

    section("PART B - EXIT WINDOW PREDICTOR");
    train_and_report(config, &cohort)?;
    print_biggest_missed(&cohort, &durations);

    section("DONE");
    Ok(())
}

fn print_headline_counts(cohort: &[(TradeRow, PeakStats)]) {
    let total = cohort.len();
    let n_15x = cohort.iter().filter(|(_, s)| s.hit_15x).count();
    let n_2x = cohort.iter().filter(|(_, s)| s.hit_2x).count();
    println!("\n  Total losing trades: {total}");
    println!("  Hit 1.5x+:  {} ({:.0}%)", n_15x, percent(n_15x, total));
    println!("  Hit 2x+:    {} ({:.0}%)", n_2x, percent(n_2x, total));
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn print_recovery(cohort: &[(TradeRow, PeakStats)]) {
    let total_pnl: Decimal = cohort.iter().map(|(t, _)| t.pnl).sum();
    let hit_15x: Vec<&TradeRow> = cohort
        .iter()
        .filter(|(_, s)| s.hit_15x)
        .map(|(t, _)| t)
        .collect();
    if hit_15x.is_empty() {
        println!("\n  Total P&L lost: ${total_pnl:.2}");
        println!("  No trades hit 1.5x exit window.");
    } else {
        let window_pnl: Decimal = hit_15x.iter().map(|t| t.pnl).sum();
        let recovered = take_profit_recovery(&hit_15x, dec!(0.5));
        println!("\n  Total P&L lost (all losers): ${total_pnl:.2}");
        println!("  P&L lost by trades with 1.5x window: ${window_pnl:.2}");
        println!("  TP at 1.5x would have recovered: +${recovered:.2}");
        println!("  Net if TP at 1.5x on those trades: ${:.2}", window_pnl + recovered);
    }

    let hit_2x: Vec<&TradeRow> = cohort
        .iter()
        .filter(|(_, s)| s.hit_2x)
        .map(|(t, _)| t)
        .collect();
    if !hit_2x.is_empty() {
        let pnl_2x: Decimal = hit_2x.iter().map(|t| t.pnl).sum();
        let recovered = take_profit_recovery(&hit_2x, Decimal::ONE);
        println!("  TP at 2.0x would have recovered: +${recovered:.2}");
        println!("  Net if TP at 2.0x on those trades: ${:.2}", pnl_2x + recovered);
    }
}

/// Hypothetical profit of a take-profit at `entry_ask * (1 + gain_fraction)`:
/// `shares * entry_ask * gain_fraction` per trade. Trades without a recorded
/// share count contribute nothing.
fn take_profit_recovery(trades: &[&TradeRow], gain_fraction: Decimal) -> Decimal {
    trades
        .iter()
        .filter_map(|t| t.shares.map(|s| s * t.entry_ask * gain_fraction))
        .sum()
}

#[derive(Default)]
struct GroupAgg {
    n: usize,
    n_15x: usize,
    peak_sum: f64,
}

impl GroupAgg {
    fn add(&mut self, stats: &PeakStats) {
        self.n += 1;
        if stats.hit_15x {
            self.n_15x += 1;
        }
        self.peak_sum += stats.peak_multiple.to_f64().unwrap_or(0.0);
    }

    fn pct_15x(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.n_15x as f64 / self.n as f64 * 100.0
        }
    }

    fn mean_peak(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.peak_sum / self.n as f64
        }
    }
}

fn print_reason_breakdown(cohort: &[(TradeRow, PeakStats)]) {
    println!("\n  Exit windows by entry_reason:");
    let mut groups: BTreeMap<&str, GroupAgg> = BTreeMap::new();
    for (trade, stats) in cohort {
        // Trades without a recorded reason stay out of the breakdown.
        if let Some(reason) = trade.entry_reason.as_deref() {
            groups.entry(reason).or_default().add(stats);
        }
    }
    let mut table = Table::new()
        .col("Reason", 18)
        .col_right("Total", 6)
        .col_right("1.5x+", 6)
        .col_right("%", 6)
        .col_right("Avg Peak", 10);
    for (reason, agg) in &groups {
        table.row([
            reason.to_string(),
            agg.n.to_string(),
            agg.n_15x.to_string(),
            format!("{:.0}%", agg.pct_15x()),
            format!("{:.2}", agg.mean_peak()),
        ]);
    }
    table.print("  ");
}

fn print_range_side_breakdown(cohort: &[(TradeRow, PeakStats)]) {
    println!("\n  Exit windows by range_type + side:");
    let mut groups: BTreeMap<(&str, &str), GroupAgg> = BTreeMap::new();
    for (trade, stats) in cohort {
        groups
            .entry((trade.range_type.as_str(), trade.side.as_str()))
            .or_default()
            .add(stats);
    }
    let mut table = Table::new()
        .col("Type", 12)
        .col("Side", 5)
        .col_right("Total", 6)
        .col_right("1.5x+", 6)
        .col_right("%", 6)
        .col_right("Avg Peak", 10);
    for ((range_type, side), agg) in &groups {
        table.row([
            range_type.to_string(),
            side.to_string(),
            agg.n.to_string(),
            agg.n_15x.to_string(),
            format!("{:.0}%", agg.pct_15x()),
            format!("{:.2}", agg.mean_peak()),
        ]);
    }
    table.print("  ");
}

fn window_durations(cohort: &[(TradeRow, PeakStats)]) -> Vec<WindowRow<'_>> {
    cohort
        .iter()
        .filter(|(_, stats)| stats.hit_15x)
        .filter_map(|(trade, stats)| {
            let entry = trade.entry_ask.to_f64()?;
            let ticks = window::parse_evaluator_log(trade.evaluator_log.as_ref());
            let window_minutes = window::window_duration_minutes(&ticks, entry * 1.5);
            Some(WindowRow {
                trade,
                stats,
                window_minutes,
            })
        })
        .collect()
}

fn print_duration_stats(durations: &[WindowRow<'_>]) {
    println!("\n  Window duration analysis (trades with 1.5x+ peak):");
    if durations.is_empty() {
        println!("  No trades had 1.5x+ exit window; skipping duration analysis.");
        return;
    }
    println!("  Trades with 1.5x+ window: {}", durations.len());
    let minutes: Vec<f64> = durations.iter().map(|w| w.window_minutes).collect();
    println!("  Window duration (minutes):");
    for (label, q) in [("p25", 0.25), ("p50", 0.50), ("p75", 0.75), ("p90", 0.90)] {
        if let Some(value) = metrics::quantile(&minutes, q) {
            println!("    {label}: {value:.0}");
        }
    }
    let max = minutes.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    println!("    max: {max:.0}");
}

fn print_detail(cohort: &[(TradeRow, PeakStats)]) {
    println!("\n  All losing trades detail:");
    let mut ranked: Vec<&(TradeRow, PeakStats)> = cohort.iter().collect();
    ranked.sort_by(|a, b| b.1.peak_multiple.cmp(&a.1.peak_multiple));
    let mut table = Table::new()
        .col("City", 14)
        .col("Range", 14)
        .col("Side", 5)
        .col_right("Entry", 6)
        .col_right("Peak", 6)
        .col_right("PeakX", 6)
        .col_right("P&L", 8)
        .col("Reason", 14);
    for (trade, stats) in ranked {
        table.row([
            trade.city.clone(),
            trade.range_name.clone(),
            trade.side.clone(),
            format!("{:.2}", trade.entry_ask),
            format!("{:.2}", trade.max_price_seen),
            format!("{:.2}", stats.peak_multiple),
            format!("{:.2}", trade.pnl),
            trade.entry_reason.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.print("  ");
}

fn train_and_report(config: &AppConfig, cohort: &[(TradeRow, PeakStats)]) -> Result<()> {
    let encoder = CityEncoder::fit(cohort.iter().map(|(t, _)| t.city.as_str()));
    let trades: Vec<&TradeRow> = cohort.iter().map(|(t, _)| t).collect();
    let targets: Vec<f64> = cohort
        .iter()
        .map(|(_, s)| if s.hit_15x { 1.0 } else { 0.0 })
        .collect();
    let matrix = features::exit_features(&trades, &targets, &encoder);

    let positives = matrix.targets.iter().filter(|&&y| y > 0.5).count();
    println!("\n  Training set: {} losing trades", matrix.len());
    println!(
        "  Target distribution: {} had exit window, {} did not",
        positives,
        matrix.len() - positives
    );

    if matrix.len() < config.analysis.min_train_samples {
        println!("  Too few samples for meaningful ML; skipping model training.");
        return Ok(());
    }

    let model = match GbdtClassifier::fit(&matrix.rows, &matrix.targets, GbdtParams::peak_exit()) {
        Ok(model) => model,
        Err(ModelError::DegenerateTarget) => {
            println!("  All usable trades share one outcome; skipping model training.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    println!("\n  Feature Importance (by gain):");
    let mut ranked: Vec<(&str, f64)> = matrix
        .names
        .iter()
        .copied()
        .zip(model.feature_importance().iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let mut table = Table::new().col("Feature", 25).col_right("Gain", 10);
    for (name, gain) in ranked {
        table.row([name.to_string(), format!("{gain:.0}")]);
    }
    table.print("  ");

    // Scored on its own training rows; the cohort is far too small for a
    // holdout split.
    let preds = model.predict_proba(&matrix.rows);
    println!(
        "\n  In-sample AUC: {:.4}",
        metrics::roc_auc(&matrix.targets, &preds)
    );
    Ok(())
}

fn print_biggest_missed(cohort: &[(TradeRow, PeakStats)], durations: &[WindowRow<'_>]) {
    println!("\n  5 Biggest Missed Exit Windows:");
    let mut table = Table::new()
        .col("City", 14)
        .col("Range", 14)
        .col("Side", 5)
        .col_right("Entry", 6)
        .col_right("Peak", 6)
        .col_right("PeakX", 6)
        .col_right("Window", 7)
        .col_right("P&L", 8);
    if durations.is_empty() {
        let mut ranked: Vec<&(TradeRow, PeakStats)> = cohort.iter().collect();
        ranked.sort_by(|a, b| b.1.peak_multiple.cmp(&a.1.peak_multiple));
        for (trade, stats) in ranked.into_iter().take(5) {
            table.row(missed_row(trade, stats, None));
        }
    } else {
        let mut ranked: Vec<&WindowRow<'_>> = durations.iter().collect();
        ranked.sort_by(|a, b| b.stats.peak_multiple.cmp(&a.stats.peak_multiple));
        for w in ranked.into_iter().take(5) {
            table.row(missed_row(w.trade, w.stats, Some(w.window_minutes)));
        }
    }
    table.print("  ");
}

fn missed_row(trade: &TradeRow, stats: &PeakStats, window_minutes: Option<f64>) -> [String; 8] {
    let window = match window_minutes {
        Some(minutes) => format!("{minutes:.0}m"),
        None => "—".to_string(),
    };
    [
        trade.city.clone(),
        trade.range_name.clone(),
        trade.side.clone(),
        format!("{:.2}", trade.entry_ask),
        format!("{:.2}", trade.max_price_seen),
        format!("{:.2}", stats.peak_multiple),
        window,
        format!("{:.2}", trade.pnl),
    ]
}
