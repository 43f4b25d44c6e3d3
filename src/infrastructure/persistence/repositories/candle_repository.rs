use crate::domain::market::Candle;
use crate::domain::model::DataRange;
use crate::domain::ports::BarSource;
use crate::domain::repositories::CandleRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Bar history; also serves as the engine's `BarSource`.
pub struct SqliteCandleRepository {
    pool: SqlitePool,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decimal_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).with_context(|| format!("Invalid decimal in {}: {}", column, raw))
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn save(&self, candle: &Candle) -> Result<()> {
        // Use UPSERT so re-imports overwrite the stored bar
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO candles (symbol, timestamp, open, high, low, close, volume)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&candle.symbol)
        .bind(candle.timestamp)
        .bind(candle.open.to_string())
        .bind(candle.high.to_string())
        .bind(candle.low.to_string())
        .bind(candle.close.to_string())
        .bind(candle.volume.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save candle")?;

        Ok(())
    }

    async fn get_range(&self, symbol: &str, start_ts: i64, end_ts: i64) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT * FROM candles WHERE symbol = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC",
        )
        .bind(symbol)
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(Candle {
                symbol: row.try_get("symbol")?,
                timestamp: row.try_get("timestamp")?,
                open: decimal_column(&row, "open")?,
                high: decimal_column(&row, "high")?,
                low: decimal_column(&row, "low")?,
                close: decimal_column(&row, "close")?,
                volume: decimal_column(&row, "volume")?,
            });
        }
        Ok(candles)
    }

    async fn prune(&self, days_retention: i64) -> Result<u64> {
        let cutoff_ts = Utc::now().timestamp_millis() - (days_retention * 24 * 60 * 60 * 1000);

        let result = sqlx::query("DELETE FROM candles WHERE timestamp < ?")
            .bind(cutoff_ts)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BarSource for SqliteCandleRepository {
    async fn load_bars(&self, symbol: &str, range: DataRange) -> Result<Vec<Candle>> {
        self.get_range(symbol, range.start, range.end).await
    }
}
