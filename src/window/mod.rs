//! Exit-window analysis over per-trade evaluator logs
//!
//! Every trade carries a JSONB history of evaluation snapshots. This module
//! parses that history into price ticks and measures how long the bid held
//! at or above a take-profit threshold.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One evaluation snapshot from a trade's history.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub ts: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

/// Parse a JSONB evaluator log into ticks.
///
/// Accepts either a JSON array or a string containing one. Entries missing
/// `ts` or `bid`, or with unparsable values, are skipped; a missing `ask`
/// defaults to 0. Entries keep their stored order, which is assumed to be
/// chronological.
pub fn parse_evaluator_log(log: Option<&Value>) -> Vec<PriceTick> {
    let Some(value) = log else {
        return Vec::new();
    };

    let parsed;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(inner)) => {
                parsed = inner;
                &parsed
            }
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let ts = entry.get("ts").and_then(timestamp)?;
            let bid = entry.get("bid").and_then(number)?;
            let ask = entry.get("ask").and_then(number).unwrap_or(0.0);
            Some(PriceTick { ts, bid, ask })
        })
        .collect()
}

/// Minutes from the first to the last tick whose bid held at or above
/// `threshold`; 0 when no tick qualifies.
pub fn window_duration_minutes(ticks: &[PriceTick], threshold: f64) -> f64 {
    let mut qualifying = ticks.iter().filter(|t| t.bid >= threshold);
    let first = match qualifying.next() {
        Some(tick) => tick.ts,
        None => return 0.0,
    };
    let last = qualifying.last().map(|t| t.ts).unwrap_or(first);
    (last - first).num_milliseconds() as f64 / 60_000.0
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn tick(minute: u32, bid: f64) -> PriceTick {
        PriceTick {
            ts: Utc.with_ymd_and_hms(2026, 2, 10, 14, minute, 0).unwrap(),
            bid,
            ask: bid + 0.02,
        }
    }

    #[test]
    fn test_window_spans_first_to_last_qualifying_tick() {
        // bids cross 0.60 at t1 and fall back after t2
        let ticks = vec![
            tick(0, 0.40),
            tick(5, 0.65),
            tick(12, 0.70),
            tick(20, 0.50),
        ];
        let minutes = window_duration_minutes(&ticks, 0.60);
        assert!((minutes - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_zero_without_qualifying_ticks() {
        let ticks = vec![tick(0, 0.40), tick(5, 0.45)];
        assert_eq!(window_duration_minutes(&ticks, 0.60), 0.0);
        assert_eq!(window_duration_minutes(&[], 0.60), 0.0);
    }

    #[test]
    fn test_single_qualifying_tick_gives_zero_span() {
        let ticks = vec![tick(0, 0.40), tick(5, 0.65), tick(9, 0.30)];
        assert_eq!(window_duration_minutes(&ticks, 0.60), 0.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let ticks = vec![tick(0, 0.60), tick(4, 0.60)];
        assert!((window_duration_minutes(&ticks, 0.60) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let log = json!([
            {"ts": "2026-02-10T14:00:00Z", "bid": 0.40, "ask": 0.42},
            {"ts": "2026-02-10T14:05:00Z"},
            {"bid": 0.55, "ask": 0.57},
            {"ts": "not a timestamp", "bid": 0.60},
            {"ts": "2026-02-10T14:10:00Z", "bid": "0.65"}
        ]);
        let ticks = parse_evaluator_log(Some(&log));
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].bid, 0.40);
        // string-typed numbers parse; missing ask defaults to 0
        assert_eq!(ticks[1].bid, 0.65);
        assert_eq!(ticks[1].ask, 0.0);
    }

    #[test]
    fn test_parse_accepts_string_wrapped_logs() {
        let raw = r#"[{"ts": "2026-02-10T14:00:00Z", "bid": 0.5, "ask": 0.52}]"#;
        let log = Value::String(raw.to_string());
        let ticks = parse_evaluator_log(Some(&log));
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].bid, 0.5);
    }

    #[test]
    fn test_parse_handles_missing_and_non_array_logs() {
        assert!(parse_evaluator_log(None).is_empty());
        assert!(parse_evaluator_log(Some(&json!({"ts": "x"}))).is_empty());
        assert!(parse_evaluator_log(Some(&Value::String("not json".into()))).is_empty());
    }
}
