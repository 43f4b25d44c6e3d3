use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Registry database wrapper
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let in_memory = db_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        // Every connection to ":memory:" opens its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Models
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                symbols_json TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                algorithm TEXT NOT NULL,
                status TEXT NOT NULL,
                hyperparameters_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                parent_id TEXT,
                baseline_accuracy REAL,
                drift_detected BOOLEAN NOT NULL DEFAULT 0,
                drift_detected_at INTEGER,
                drift_recovery_streak INTEGER NOT NULL DEFAULT 0,
                active_run_id TEXT,
                active_artifact TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_models_status ON models (status);
            CREATE INDEX IF NOT EXISTS idx_models_parent ON models (parent_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create models table")?;

        // 2. Training runs
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_runs (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                purpose_json TEXT NOT NULL,
                status TEXT NOT NULL,
                hyperparameters_json TEXT NOT NULL,
                data_range_json TEXT,
                splits_json TEXT NOT NULL,
                loss_trace_json TEXT NOT NULL,
                train_metrics_json TEXT,
                validation_metrics_json TEXT,
                test_metrics_json TEXT,
                artifact_checksum TEXT,
                failure_reason TEXT,
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_training_runs_model
            ON training_runs (model_id, started_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create training_runs table")?;

        // 3. Walk-forward reports
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS walk_forward_reports (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                config_json TEXT NOT NULL,
                windows_json TEXT NOT NULL,
                aggregate_json TEXT NOT NULL,
                mean_accuracy REAL NOT NULL,
                recommendation TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wf_reports_model
            ON walk_forward_reports (model_id, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create walk_forward_reports table")?;

        // 4. Feature importances
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feature_importances (
                training_run_id TEXT NOT NULL,
                feature_name TEXT NOT NULL,
                feature_index INTEGER NOT NULL,
                importance REAL NOT NULL,
                rank INTEGER NOT NULL,
                PRIMARY KEY (training_run_id, feature_index)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create feature_importances table")?;

        // 5. Performance samples
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performance_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                accuracy REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_perf_samples_model_time
            ON performance_samples (model_id, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create performance_samples table")?;

        // 6. Candles
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (symbol, timestamp)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candles table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_schema_is_created() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        for expected in [
            "candles",
            "feature_importances",
            "models",
            "performance_samples",
            "training_runs",
            "walk_forward_reports",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }
}
