//! Opportunity-level win prediction report.
//!
//! Trains a gradient boosted classifier on resolved opportunities created
//! before the split date and scores the rest, then walks through the
//! questions that matter for deployment: which features carry the model,
//! whether the focus city behaves differently from the rest of the book,
//! how calibrated the scores are against the production probability, and
//! where the model is most wrong. Scored test rows land in a CSV for
//! downstream slicing.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::Result;
use crate::features::{self, CityEncoder, FeatureMatrix};
use crate::metrics;
use crate::model::{GbdtClassifier, GbdtParams, ModelError};
use crate::report::{banner, section, Table};
use crate::types::OpportunityRow;

const RANGE_TYPES: [&str; 2] = ["bounded", "unbounded"];
const ASK_BUCKETS: [&str; 4] = ["<20c", "20-40c", "40-60c", "60c+"];

/// One scored test row with the source fields the report slices on.
struct EvalDetail<'a> {
    rec: &'a OpportunityRow,
    ask: f64,
    hours: f64,
    our_probability: f64,
    pred: f64,
    target: f64,
}

pub async fn run(config: &AppConfig) -> Result<()> {
    banner("ML WIN PREDICTOR - Opportunity-Level Classifier");

    println!("\n[1] Loading data from PostgreSQL...");
    let db = Database::connect(&config.database.url).await?;
    let rows = db.fetch_opportunities(&config.analysis).await?;
    db.close().await;
    report(config, &rows)
}

/// Everything after the load: split, fit, score, print, export.
fn report(config: &AppConfig, rows: &[OpportunityRow]) -> Result<()> {
    println!(
        "    Loaded {} resolved {} opportunities",
        rows.len(),
        config.analysis.platform
    );

    // One city mapping over the whole batch, shared by both partitions.
    let encoder = CityEncoder::fit(rows.iter().map(|r| r.city.as_str()));
    let mapping: Vec<String> = encoder
        .mapping()
        .map(|(city, code)| format!("'{city}': {code}"))
        .collect();
    println!("    Cities: {{{}}}", mapping.join(", "));

    let cutoff = config.analysis.split_date;
    let (train, eval) = features::split_by_time(rows, cutoff);
    let cutoff_label = cutoff.format("%b %-d").to_string();
    println!("    Train: {} rows (before {cutoff_label})", train.len());
    println!("    Test:  {} rows ({cutoff_label}+)", eval.len());
    println!("    Train win rate: {}", win_rate_label(&train));
    println!("    Test  win rate: {}", win_rate_label(&eval));

    let train_matrix = features::win_features(&train, &encoder);
    let eval_matrix = features::win_features(&eval, &encoder);
    println!("    Train after NaN drop: {}", train_matrix.len());
    println!("    Test  after NaN drop: {}", eval_matrix.len());

    let min = config.analysis.min_train_samples;
    if train_matrix.len() < min || eval_matrix.len() < min {
        println!("\n  Too few samples for meaningful ML; skipping model training.");
        return Ok(());
    }

    println!("\n[2] Training gradient boosted trees...");
    let model = match GbdtClassifier::fit(
        &train_matrix.rows,
        &train_matrix.targets,
        GbdtParams::win_predictor(),
    ) {
        Ok(model) => model,
        Err(ModelError::DegenerateTarget) => {
            println!("    Training target has a single class; skipping model training.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let preds = model.predict_proba(&eval_matrix.rows);
    println!(
        "    Test AUC: {:.4}",
        metrics::roc_auc(&eval_matrix.targets, &preds)
    );
    println!(
        "    Test Log Loss: {:.4}",
        metrics::log_loss(&eval_matrix.targets, &preds)
    );

    section("[3] FEATURE IMPORTANCE (top 15 by gain)");
    print_importance(&model, &train_matrix.names);

    let details = eval_details(&eval, &eval_matrix, &preds);

    let focus = config.analysis.focus_city.as_str();
    section(&format!(
        "[4] {} ISOLATION ANALYSIS (test set)",
        focus.to_uppercase()
    ));
    if encoder.contains(focus) {
        let focus_title = capitalize(focus);
        println!("\n  Average predicted win prob - {focus_title} vs Others:");
        cross_tab(&details, focus, &focus_title, "Pred", |d| d.pred, |v| {
            format!("{v:.3}")
        })
        .print("  ");
        println!("\n  Actual win rate - {focus_title} vs Others:");
        cross_tab(&details, focus, &focus_title, "Win%", |d| d.target, |v| {
            format!("{:.1}%", v * 100.0)
        })
        .print("  ");
    } else {
        println!("  {} not found in test set.", capitalize(focus));
    }

    section("[5] CALIBRATION COMPARISON (test set, 10 equal-width bins)");
    println!("\n  ML Model Calibration:");
    calibration_table(&preds, &eval_matrix.targets, "Mean Pred").print("  ");
    println!("\n  Baseline (our_probability) Calibration:");
    let baseline: Vec<f64> = details.iter().map(|d| d.our_probability).collect();
    calibration_table(&baseline, &eval_matrix.targets, "Mean Prob").print("  ");

    section("[6] WORST MODEL MISSES (20 rows, largest |pred - actual|)");
    print_worst(&details);

    let out_path = config.predictions_path();
    export_predictions(&out_path, &details, &eval_matrix)?;
    println!("\n  Saved {} test predictions to {}", details.len(), out_path);

    section("DONE");
    Ok(())
}

fn win_rate_label(rows: &[OpportunityRow]) -> String {
    if rows.is_empty() {
        return "n/a".to_string();
    }
    let wins = rows.iter().filter(|r| r.would_have_won).count();
    format!("{:.3}", wins as f64 / rows.len() as f64)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn print_importance(model: &GbdtClassifier, names: &[&'static str]) {
    let mut ranked: Vec<(&str, f64)> = names
        .iter()
        .copied()
        .zip(model.feature_importance().iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let mut table = Table::new().col("Feature", 25).col_right("Gain", 10);
    for (name, gain) in ranked.into_iter().take(15) {
        table.row([name.to_string(), format!("{gain:.0}")]);
    }
    table.print("");
}

/// Pair each kept matrix row back with its source record and score.
fn eval_details<'a>(
    eval: &'a [OpportunityRow],
    matrix: &FeatureMatrix,
    preds: &[f64],
) -> Vec<EvalDetail<'a>> {
    matrix
        .kept
        .iter()
        .enumerate()
        .map(|(i, &src)| {
            let rec = &eval[src];
            EvalDetail {
                rec,
                ask: rec.ask.to_f64().unwrap_or(0.0),
                hours: rec
                    .hours_to_resolution
                    .and_then(|d| d.to_f64())
                    .unwrap_or(0.0),
                our_probability: rec.our_probability.to_f64().unwrap_or(0.0),
                pred: preds[i],
                target: matrix.targets[i],
            }
        })
        .collect()
}

fn ask_bucket(ask: f64) -> &'static str {
    if ask < 0.20 {
        "<20c"
    } else if ask < 0.40 {
        "20-40c"
    } else if ask < 0.60 {
        "40-60c"
    } else {
        "60c+"
    }
}

/// Focus-city vs rest-of-book means over range type and ask bucket.
/// Cells with no rows show a dash.
fn cross_tab<V, R>(
    details: &[EvalDetail<'_>],
    focus_city: &str,
    focus_title: &str,
    value_header: &str,
    value: V,
    render: R,
) -> Table
where
    V: Fn(&EvalDetail<'_>) -> f64,
    R: Fn(f64) -> String,
{
    let mut table = Table::new()
        .col("Range Type", 12)
        .col("Ask Bucket", 10)
        .col_right(&format!("{focus_title} {value_header}"), 10)
        .col_right(&format!("{focus_title} N"), 8)
        .col_right(&format!("Others {value_header}"), 11)
        .col_right("Others N", 9);
    for range_type in RANGE_TYPES {
        for bucket in ASK_BUCKETS {
            let cell = |is_focus: bool| -> (String, usize) {
                let mut n = 0usize;
                let mut sum = 0.0;
                for d in details {
                    if (d.rec.city == focus_city) == is_focus
                        && d.rec.range_type == range_type
                        && ask_bucket(d.ask) == bucket
                    {
                        n += 1;
                        sum += value(d);
                    }
                }
                let shown = if n == 0 {
                    "—".to_string()
                } else {
                    render(sum / n as f64)
                };
                (shown, n)
            };
            let (focus_value, focus_n) = cell(true);
            let (others_value, others_n) = cell(false);
            table.row([
                range_type.to_string(),
                bucket.to_string(),
                focus_value,
                focus_n.to_string(),
                others_value,
                others_n.to_string(),
            ]);
        }
    }
    table
}

fn calibration_table(probs: &[f64], targets: &[f64], value_header: &str) -> Table {
    let mut table = Table::new()
        .col("Bucket", 15)
        .col_right(value_header, 10)
        .col_right("Actual Win%", 12)
        .col_right("Count", 8);
    for bin in metrics::calibration_bins(probs, targets, 10) {
        if bin.count == 0 {
            continue;
        }
        table.row([
            bin.label(),
            format!("{:.3}", bin.mean_pred),
            format!("{:.1}%", bin.observed_rate * 100.0),
            bin.count.to_string(),
        ]);
    }
    table
}

fn worst_misses<'a, 'b>(details: &'b [EvalDetail<'a>], n: usize) -> Vec<&'b EvalDetail<'a>> {
    let mut ranked: Vec<&EvalDetail<'_>> = details.iter().collect();
    ranked.sort_by(|a, b| {
        let miss_a = (a.pred - a.target).abs();
        let miss_b = (b.pred - b.target).abs();
        miss_b.partial_cmp(&miss_a).unwrap_or(Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}

fn print_worst(details: &[EvalDetail<'_>]) {
    let mut table = Table::new()
        .col("City", 14)
        .col("Type", 10)
        .col("Side", 5)
        .col_right("Ask", 5)
        .col_right("Hrs", 6)
        .col_right("OurProb", 8)
        .col_right("Pred", 6)
        .col_right("Won", 4);
    for d in worst_misses(details, 20) {
        table.row([
            d.rec.city.clone(),
            d.rec.range_type.clone(),
            d.rec.side.clone(),
            format!("{:.2}", d.ask),
            format!("{:.0}", d.hours),
            format!("{:.3}", d.our_probability),
            format!("{:.3}", d.pred),
            format!("{}", d.target as i64),
        ]);
    }
    table.print("  ");
}

/// Row layout of the exported CSV: the feature columns in matrix order,
/// then the identifying fields and the score.
#[derive(Debug, Serialize)]
struct PredictionRecord {
    ask: f64,
    bid: f64,
    spread: f64,
    our_probability: f64,
    ensemble_std_dev: f64,
    hours_to_resolution: f64,
    range_width: f64,
    range_type_enc: f64,
    side_enc: f64,
    city_enc: f64,
    month: f64,
    hour_of_day: f64,
    ask_x_hours: f64,
    prob_minus_ask: f64,
    city: String,
    range_type: String,
    side: String,
    pred_prob: f64,
    would_have_won: bool,
    created_at: DateTime<Utc>,
}

fn export_predictions(
    path: &str,
    details: &[EvalDetail<'_>],
    matrix: &FeatureMatrix,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (detail, row) in details.iter().zip(&matrix.rows) {
        let [ask, bid, spread, our_probability, ensemble_std_dev, hours_to_resolution, range_width, range_type_enc, side_enc, city_enc, month, hour_of_day, ask_x_hours, prob_minus_ask] =
            row.as_slice()
        else {
            continue;
        };
        writer.serialize(PredictionRecord {
            ask: *ask,
            bid: *bid,
            spread: *spread,
            our_probability: *our_probability,
            ensemble_std_dev: *ensemble_std_dev,
            hours_to_resolution: *hours_to_resolution,
            range_width: *range_width,
            range_type_enc: *range_type_enc,
            side_enc: *side_enc,
            city_enc: *city_enc,
            month: *month,
            hour_of_day: *hour_of_day,
            ask_x_hours: *ask_x_hours,
            prob_minus_ask: *prob_minus_ask,
            city: detail.rec.city.clone(),
            range_type: detail.rec.range_type.clone(),
            side: detail.rec.side.clone(),
            pred_prob: detail.pred,
            would_have_won: detail.target > 0.5,
            created_at: detail.rec.created_at,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn make_opportunity(
        city: &str,
        range_type: &str,
        ask: Decimal,
        won: bool,
        day: u32,
    ) -> OpportunityRow {
        OpportunityRow {
            city: city.to_string(),
            range_type: range_type.to_string(),
            side: "YES".to_string(),
            ask,
            bid: Some(ask - dec!(0.02)),
            spread: Some(dec!(0.02)),
            our_probability: dec!(0.50),
            ensemble_std_dev: Some(dec!(0.05)),
            hours_to_resolution: Some(dec!(24)),
            range_width: Some(dec!(3)),
            would_have_won: won,
            created_at: Utc.with_ymd_and_hms(2026, 2, day, 9, 30, 0).unwrap(),
        }
    }

    fn make_detail<'a>(rec: &'a OpportunityRow, pred: f64) -> EvalDetail<'a> {
        EvalDetail {
            rec,
            ask: rec.ask.to_f64().unwrap(),
            hours: 24.0,
            our_probability: 0.5,
            pred,
            target: rec.target(),
        }
    }

    #[test]
    fn test_ask_buckets_partition_the_price_range() {
        assert_eq!(ask_bucket(0.0), "<20c");
        assert_eq!(ask_bucket(0.19), "<20c");
        assert_eq!(ask_bucket(0.20), "20-40c");
        assert_eq!(ask_bucket(0.39), "20-40c");
        assert_eq!(ask_bucket(0.40), "40-60c");
        assert_eq!(ask_bucket(0.60), "60c+");
        assert_eq!(ask_bucket(0.95), "60c+");
    }

    #[test]
    fn test_worst_misses_rank_by_absolute_error() {
        let rows = vec![
            make_opportunity("seoul", "bounded", dec!(0.30), true, 21),
            make_opportunity("tokyo", "bounded", dec!(0.30), true, 21),
            make_opportunity("paris", "bounded", dec!(0.30), false, 21),
        ];
        let details = vec![
            make_detail(&rows[0], 0.9), // miss 0.1
            make_detail(&rows[1], 0.2), // miss 0.8
            make_detail(&rows[2], 0.6), // miss 0.6
        ];
        let ranked = worst_misses(&details, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].rec.city, "tokyo");
        assert_eq!(ranked[1].rec.city, "paris");
    }

    #[test]
    fn test_cross_tab_marks_empty_cells() {
        let rows = vec![
            make_opportunity("seoul", "bounded", dec!(0.10), true, 21),
            make_opportunity("tokyo", "bounded", dec!(0.15), false, 21),
        ];
        let details = vec![make_detail(&rows[0], 0.8), make_detail(&rows[1], 0.3)];
        let table = cross_tab(&details, "seoul", "Seoul", "Pred", |d| d.pred, |v| {
            format!("{v:.3}")
        });
        let lines: Vec<String> = table.lines().collect();
        // Header, rule, then one row per range type and bucket combination.
        assert_eq!(lines.len(), 10);
        assert!(lines[2].starts_with("bounded"));
        assert!(lines[2].contains("0.800"));
        assert!(lines[2].contains("0.300"));
        assert!(lines[9].contains("—"));
    }

    #[test]
    fn test_eval_details_align_with_kept_rows() {
        let mut middle = make_opportunity("tokyo", "bounded", dec!(0.30), false, 21);
        middle.hours_to_resolution = None;
        let eval = vec![
            make_opportunity("seoul", "bounded", dec!(0.20), true, 21),
            middle,
            make_opportunity("paris", "unbounded", dec!(0.40), false, 22),
        ];
        let encoder = CityEncoder::fit(eval.iter().map(|r| r.city.as_str()));
        let matrix = features::win_features(&eval, &encoder);
        assert_eq!(matrix.len(), 2);

        let preds = vec![0.4, 0.6];
        let details = eval_details(&eval, &matrix, &preds);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].rec.city, "seoul");
        assert_eq!(details[1].rec.city, "paris");
        assert_eq!(details[0].target, 1.0);
        assert_eq!(details[1].target, 0.0);
        assert_eq!(details[1].pred, 0.6);
    }

    #[test]
    fn test_export_writes_one_line_per_kept_row() {
        let eval = vec![
            make_opportunity("seoul", "bounded", dec!(0.20), true, 21),
            make_opportunity("paris", "unbounded", dec!(0.40), false, 22),
        ];
        let encoder = CityEncoder::fit(eval.iter().map(|r| r.city.as_str()));
        let matrix = features::win_features(&eval, &encoder);
        let preds = vec![0.4, 0.6];
        let details = eval_details(&eval, &matrix, &preds);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preds.csv");
        export_predictions(path.to_str().unwrap(), &details, &matrix).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("ask,bid,spread,our_probability,ensemble_std_dev"));
        assert!(header.ends_with("city,range_type,side,pred_prob,would_have_won,created_at"));
        assert_eq!(lines.count(), 2);
        assert!(contents.contains("seoul"));
        assert!(contents.contains("0.4"));
    }

    #[test]
    fn test_sub_threshold_partitions_skip_training() {
        // Every row lands after the default cutoff: the train partition is
        // empty and the eval side holds four rows, both under the minimum.
        // The gate has to return before the trainer sees the empty matrix.
        let config = AppConfig::default();
        let rows = vec![
            make_opportunity("seoul", "bounded", dec!(0.20), true, 21),
            make_opportunity("seoul", "bounded", dec!(0.25), false, 22),
            make_opportunity("tokyo", "bounded", dec!(0.30), true, 23),
            make_opportunity("paris", "unbounded", dec!(0.40), false, 24),
        ];
        report(&config, &rows).unwrap();
    }

    #[test]
    fn test_win_rate_label_handles_empty_partitions() {
        assert_eq!(win_rate_label(&[]), "n/a");
        let rows = vec![
            make_opportunity("seoul", "bounded", dec!(0.20), true, 10),
            make_opportunity("seoul", "bounded", dec!(0.20), false, 11),
        ];
        assert_eq!(win_rate_label(&rows), "0.500");
    }

    #[test]
    fn test_capitalize_focus_city() {
        assert_eq!(capitalize("seoul"), "Seoul");
        assert_eq!(capitalize(""), "");
    }
}
