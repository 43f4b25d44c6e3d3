use super::{from_millis, parse_uuid};
use crate::domain::model::{RunStatus, TrainingRun};
use crate::domain::repositories::TrainingRunRepository;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteTrainingRunRepository {
    pool: SqlitePool,
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid {} column", column))
}

fn optional_json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<Option<T>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|r| serde_json::from_str(&r).with_context(|| format!("Invalid {} column", column)))
        .transpose()
}

impl SqliteTrainingRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> Result<TrainingRun> {
        let id: String = row.try_get("id")?;
        let model_id: String = row.try_get("model_id")?;
        let status: String = row.try_get("status")?;
        let completed_at: Option<i64> = row.try_get("completed_at")?;
        let duration_ms: Option<i64> = row.try_get("duration_ms")?;

        Ok(TrainingRun {
            id: parse_uuid(&id)?,
            model_id: parse_uuid(&model_id)?,
            purpose: json_column(row, "purpose_json")?,
            status: RunStatus::from_str(&status)?,
            hyperparameters: json_column(row, "hyperparameters_json")?,
            data_range: optional_json_column(row, "data_range_json")?,
            splits: json_column(row, "splits_json")?,
            loss_trace: json_column(row, "loss_trace_json")?,
            train_metrics: optional_json_column(row, "train_metrics_json")?,
            validation_metrics: optional_json_column(row, "validation_metrics_json")?,
            test_metrics: optional_json_column(row, "test_metrics_json")?,
            artifact_checksum: row.try_get("artifact_checksum")?,
            failure_reason: row.try_get("failure_reason")?,
            started_at: from_millis(row.try_get("started_at")?)?,
            completed_at: completed_at.map(from_millis).transpose()?,
            duration_ms: duration_ms.map(|d| d.max(0) as u64),
        })
    }
}

fn to_json_opt<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value.as_ref().map(serde_json::to_string).transpose().map_err(Into::into)
}

#[async_trait]
impl TrainingRunRepository for SqliteTrainingRunRepository {
    async fn insert(&self, run: &TrainingRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_runs
            (id, model_id, purpose_json, status, hyperparameters_json, data_range_json,
             splits_json, loss_trace_json, train_metrics_json, validation_metrics_json,
             test_metrics_json, artifact_checksum, failure_reason, started_at, completed_at,
             duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.model_id.to_string())
        .bind(serde_json::to_string(&run.purpose)?)
        .bind(run.status.as_str())
        .bind(serde_json::to_string(&run.hyperparameters)?)
        .bind(to_json_opt(&run.data_range)?)
        .bind(serde_json::to_string(&run.splits)?)
        .bind(serde_json::to_string(&run.loss_trace)?)
        .bind(to_json_opt(&run.train_metrics)?)
        .bind(to_json_opt(&run.validation_metrics)?)
        .bind(to_json_opt(&run.test_metrics)?)
        .bind(&run.artifact_checksum)
        .bind(&run.failure_reason)
        .bind(run.started_at.timestamp_millis())
        .bind(run.completed_at.map(|t| t.timestamp_millis()))
        .bind(run.duration_ms.map(|d| d as i64))
        .execute(&self.pool)
        .await
        .context("Failed to insert training run")?;
        Ok(())
    }

    async fn finish(&self, run: &TrainingRun) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE training_runs SET
                status = ?, loss_trace_json = ?, train_metrics_json = ?,
                validation_metrics_json = ?, test_metrics_json = ?, artifact_checksum = ?,
                failure_reason = ?, completed_at = ?, duration_ms = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(run.status.as_str())
        .bind(serde_json::to_string(&run.loss_trace)?)
        .bind(to_json_opt(&run.train_metrics)?)
        .bind(to_json_opt(&run.validation_metrics)?)
        .bind(to_json_opt(&run.test_metrics)?)
        .bind(&run.artifact_checksum)
        .bind(&run.failure_reason)
        .bind(run.completed_at.map(|t| t.timestamp_millis()))
        .bind(run.duration_ms.map(|d| d as i64))
        .bind(run.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to finish training run")?;

        if result.rows_affected() == 0 {
            bail!("training run {} is missing or already finished", run.id);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TrainingRun>> {
        let row = sqlx::query("SELECT * FROM training_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_model(&self, model_id: Uuid) -> Result<Vec<TrainingRun>> {
        let rows = sqlx::query(
            "SELECT * FROM training_runs WHERE model_id = ? ORDER BY started_at ASC, rowid ASC",
        )
        .bind(model_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM training_runs WHERE model_id = ?")
            .bind(model_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
