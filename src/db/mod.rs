//! Read-only store access
//!
//! Each pipeline opens a connection, runs exactly one query, and closes it
//! before any computation starts. Nothing here ever writes.

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::{AppError, Result};
use crate::types::{OpportunityRow, TradeRow};

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a single-connection pool against the configured store.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Release the connection. Called once the pipeline's rows are in memory.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Settled losing trades for the peak-exit cohort.
    ///
    /// `entry_ask > 0` is part of the filter: it is the divisor of the
    /// peak multiple downstream.
    pub async fn fetch_losing_trades(&self, analysis: &AnalysisConfig) -> Result<Vec<TradeRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, city, range_name, range_type, range_unit, side,
                   entry_ask, entry_bid, entry_spread, entry_probability, entry_edge_pct,
                   cost, shares, max_price_seen, pnl, status,
                   entry_reason, hours_to_resolution, evaluator_log, created_at
            FROM trades
            WHERE status = ANY($1)
              AND won = false
              AND max_price_seen IS NOT NULL
              AND entry_ask IS NOT NULL
              AND entry_ask > 0
              AND pnl IS NOT NULL
            ORDER BY created_at
            "#,
        )
        .bind(&analysis.trade_statuses)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(AppError::EmptyResult { table: "trades" });
        }

        let trades = rows
            .iter()
            .map(trade_from_row)
            .collect::<Result<Vec<_>>>()?;
        info!(count = trades.len(), "loaded losing trades");
        Ok(trades)
    }

    /// Resolved opportunities with a known outcome for the win predictor.
    pub async fn fetch_opportunities(
        &self,
        analysis: &AnalysisConfig,
    ) -> Result<Vec<OpportunityRow>> {
        let rows = sqlx::query(
            r#"
            SELECT city, range_type, side, ask, bid, spread,
                   our_probability, ensemble_std_dev, hours_to_resolution,
                   range_width, would_have_won, created_at
            FROM opportunities
            WHERE (model_valid = true OR model_valid IS NULL)
              AND platform = $1
              AND would_have_won IS NOT NULL
              AND ask IS NOT NULL AND our_probability IS NOT NULL
            ORDER BY created_at
            "#,
        )
        .bind(&analysis.platform)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(AppError::EmptyResult {
                table: "opportunities",
            });
        }

        let opportunities = rows
            .iter()
            .map(opportunity_from_row)
            .collect::<Result<Vec<_>>>()?;
        info!(count = opportunities.len(), "loaded resolved opportunities");
        Ok(opportunities)
    }
}

/// `try_get` with missing columns reported as schema errors instead of a
/// generic database failure.
fn col<'r, T>(row: &'r PgRow, table: &'static str, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| match e {
        sqlx::Error::ColumnNotFound(column) => AppError::Schema { table, column },
        other => AppError::Database(other),
    })
}

fn trade_from_row(row: &PgRow) -> Result<TradeRow> {
    const TABLE: &str = "trades";
    Ok(TradeRow {
        id: col(row, TABLE, "id")?,
        city: col(row, TABLE, "city")?,
        range_name: col(row, TABLE, "range_name")?,
        range_type: col(row, TABLE, "range_type")?,
        range_unit: col(row, TABLE, "range_unit")?,
        side: col(row, TABLE, "side")?,
        entry_ask: col(row, TABLE, "entry_ask")?,
        entry_bid: col(row, TABLE, "entry_bid")?,
        entry_spread: col(row, TABLE, "entry_spread")?,
        entry_probability: col(row, TABLE, "entry_probability")?,
        entry_edge_pct: col(row, TABLE, "entry_edge_pct")?,
        cost: col(row, TABLE, "cost")?,
        shares: col(row, TABLE, "shares")?,
        max_price_seen: col(row, TABLE, "max_price_seen")?,
        pnl: col(row, TABLE, "pnl")?,
        status: col(row, TABLE, "status")?,
        entry_reason: col(row, TABLE, "entry_reason")?,
        hours_to_resolution: col(row, TABLE, "hours_to_resolution")?,
        evaluator_log: col(row, TABLE, "evaluator_log")?,
        created_at: col(row, TABLE, "created_at")?,
    })
}

fn opportunity_from_row(row: &PgRow) -> Result<OpportunityRow> {
    const TABLE: &str = "opportunities";
    Ok(OpportunityRow {
        city: col(row, TABLE, "city")?,
        range_type: col(row, TABLE, "range_type")?,
        side: col(row, TABLE, "side")?,
        ask: col(row, TABLE, "ask")?,
        bid: col(row, TABLE, "bid")?,
        spread: col(row, TABLE, "spread")?,
        our_probability: col(row, TABLE, "our_probability")?,
        ensemble_std_dev: col(row, TABLE, "ensemble_std_dev")?,
        hours_to_resolution: col(row, TABLE, "hours_to_resolution")?,
        range_width: col(row, TABLE, "range_width")?,
        would_have_won: col(row, TABLE, "would_have_won")?,
        created_at: col(row, TABLE, "created_at")?,
    })
}
