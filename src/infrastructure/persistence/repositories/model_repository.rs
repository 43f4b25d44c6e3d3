use super::{from_millis, parse_uuid};
use crate::domain::model::{Model, ModelFilter, ModelStatus};
use crate::domain::repositories::ModelRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

pub struct SqliteModelRepository {
    pool: SqlitePool,
}

impl SqliteModelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> Result<Model> {
        let id: String = row.try_get("id")?;
        let symbols_json: String = row.try_get("symbols_json")?;
        let timeframe: String = row.try_get("timeframe")?;
        let algorithm: String = row.try_get("algorithm")?;
        let status: String = row.try_get("status")?;
        let hyperparameters_json: String = row.try_get("hyperparameters_json")?;
        let parent_id: Option<String> = row.try_get("parent_id")?;
        let drift_detected_at: Option<i64> = row.try_get("drift_detected_at")?;
        let active_run_id: Option<String> = row.try_get("active_run_id")?;
        let streak: i64 = row.try_get("drift_recovery_streak")?;

        Ok(Model {
            id: parse_uuid(&id)?,
            name: row.try_get("name")?,
            symbols: serde_json::from_str(&symbols_json).context("Invalid symbols_json")?,
            timeframe: timeframe.parse()?,
            algorithm: algorithm.parse()?,
            status: ModelStatus::from_str(&status)?,
            hyperparameters: serde_json::from_str(&hyperparameters_json)
                .context("Invalid hyperparameters_json")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
            parent_id: parent_id.as_deref().map(parse_uuid).transpose()?,
            baseline_accuracy: row.try_get("baseline_accuracy")?,
            drift_detected: row.try_get("drift_detected")?,
            drift_detected_at: drift_detected_at.map(from_millis).transpose()?,
            drift_recovery_streak: streak.max(0) as u32,
            active_run_id: active_run_id.as_deref().map(parse_uuid).transpose()?,
            active_artifact: row.try_get("active_artifact")?,
        })
    }
}

#[async_trait]
impl ModelRepository for SqliteModelRepository {
    async fn insert(&self, model: &Model) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO models
            (id, name, symbols_json, timeframe, algorithm, status, hyperparameters_json,
             created_at, updated_at, parent_id, baseline_accuracy, drift_detected,
             drift_detected_at, drift_recovery_streak, active_run_id, active_artifact)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(model.id.to_string())
        .bind(&model.name)
        .bind(serde_json::to_string(&model.symbols)?)
        .bind(model.timeframe.as_str())
        .bind(model.algorithm.as_str())
        .bind(model.status.as_str())
        .bind(serde_json::to_string(&model.hyperparameters)?)
        .bind(model.created_at.timestamp_millis())
        .bind(model.updated_at.timestamp_millis())
        .bind(model.parent_id.map(|p| p.to_string()))
        .bind(model.baseline_accuracy)
        .bind(model.drift_detected)
        .bind(model.drift_detected_at.map(|t| t.timestamp_millis()))
        .bind(model.drift_recovery_streak as i64)
        .bind(model.active_run_id.map(|r| r.to_string()))
        .bind(&model.active_artifact)
        .execute(&self.pool)
        .await
        .context("Failed to insert model")?;

        debug!("Persisted model {}", model.id);
        Ok(())
    }

    async fn update(&self, model: &Model) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE models SET
                name = ?, symbols_json = ?, timeframe = ?, algorithm = ?, status = ?,
                hyperparameters_json = ?, updated_at = ?, parent_id = ?, baseline_accuracy = ?,
                drift_detected = ?, drift_detected_at = ?, drift_recovery_streak = ?,
                active_run_id = ?, active_artifact = ?
            WHERE id = ?
            "#,
        )
        .bind(&model.name)
        .bind(serde_json::to_string(&model.symbols)?)
        .bind(model.timeframe.as_str())
        .bind(model.algorithm.as_str())
        .bind(model.status.as_str())
        .bind(serde_json::to_string(&model.hyperparameters)?)
        .bind(model.updated_at.timestamp_millis())
        .bind(model.parent_id.map(|p| p.to_string()))
        .bind(model.baseline_accuracy)
        .bind(model.drift_detected)
        .bind(model.drift_detected_at.map(|t| t.timestamp_millis()))
        .bind(model.drift_recovery_streak as i64)
        .bind(model.active_run_id.map(|r| r.to_string()))
        .bind(&model.active_artifact)
        .bind(model.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update model")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("model {} does not exist", model.id);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Model>> {
        let row = sqlx::query("SELECT * FROM models WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list(&self, filter: &ModelFilter) -> Result<Vec<Model>> {
        // Filtering on JSON-encoded symbols is simpler in Rust than SQL.
        let rows = sqlx::query("SELECT * FROM models ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut models = Vec::with_capacity(rows.len());
        for row in &rows {
            let model = Self::map_row(row)?;
            if filter.matches(&model) {
                models.push(model);
            }
        }
        Ok(models)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM models WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: &[ModelStatus],
        new_status: ModelStatus,
    ) -> Result<Option<ModelStatus>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM models WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let current = ModelStatus::from_str(&row.try_get::<String, _>("status")?)?;
        if !expected.contains(&current) {
            return Ok(None);
        }

        // Guarded on the observed status so a concurrent writer makes this a no-op.
        let result = sqlx::query(
            "UPDATE models SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(new_status.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((result.rows_affected() == 1).then_some(current))
    }
}
