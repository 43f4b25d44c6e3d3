use super::{from_millis, parse_uuid};
use crate::domain::model::PerformanceSample;
use crate::domain::repositories::PerformanceSampleRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub struct SqlitePerformanceSampleRepository {
    pool: SqlitePool,
}

impl SqlitePerformanceSampleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PerformanceSampleRepository for SqlitePerformanceSampleRepository {
    async fn append(&self, sample: &PerformanceSample) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO performance_samples (model_id, timestamp, accuracy) VALUES (?, ?, ?)",
        )
        .bind(sample.model_id.to_string())
        .bind(sample.timestamp.timestamp_millis())
        .bind(sample.accuracy)
        .execute(&self.pool)
        .await
        .context("Failed to append performance sample")?;
        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, model_id: Uuid, limit: usize) -> Result<Vec<PerformanceSample>> {
        let rows = sqlx::query(
            "SELECT * FROM performance_samples WHERE model_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(model_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let model: String = row.try_get("model_id")?;
            samples.push(PerformanceSample {
                id: Some(row.try_get("id")?),
                model_id: parse_uuid(&model)?,
                timestamp: from_millis(row.try_get("timestamp")?)?,
                accuracy: row.try_get("accuracy")?,
            });
        }
        Ok(samples)
    }

    async fn count(&self, model_id: Uuid) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM performance_samples WHERE model_id = ?")
            .bind(model_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }

    async fn prune_before(&self, model_id: Uuid, cutoff: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM performance_samples WHERE model_id = ? AND timestamp < ?")
                .bind(model_id.to_string())
                .bind(cutoff.timestamp_millis())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM performance_samples WHERE model_id = ?")
            .bind(model_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
