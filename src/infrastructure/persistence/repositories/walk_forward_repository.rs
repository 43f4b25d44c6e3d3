use super::{from_millis, parse_uuid};
use crate::domain::model::WalkForwardReport;
use crate::domain::repositories::WalkForwardReportRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub struct SqliteWalkForwardReportRepository {
    pool: SqlitePool,
}

impl SqliteWalkForwardReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> Result<WalkForwardReport> {
        let id: String = row.try_get("id")?;
        let model_id: String = row.try_get("model_id")?;
        let config: String = row.try_get("config_json")?;
        let windows: String = row.try_get("windows_json")?;
        let aggregate: String = row.try_get("aggregate_json")?;

        Ok(WalkForwardReport {
            id: parse_uuid(&id)?,
            model_id: parse_uuid(&model_id)?,
            created_at: from_millis(row.try_get("created_at")?)?,
            config: serde_json::from_str(&config).context("Invalid config_json")?,
            windows: serde_json::from_str(&windows).context("Invalid windows_json")?,
            aggregate: serde_json::from_str(&aggregate).context("Invalid aggregate_json")?,
        })
    }
}

#[async_trait]
impl WalkForwardReportRepository for SqliteWalkForwardReportRepository {
    async fn save(&self, report: &WalkForwardReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO walk_forward_reports
            (id, model_id, created_at, config_json, windows_json, aggregate_json,
             mean_accuracy, recommendation)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.id.to_string())
        .bind(report.model_id.to_string())
        .bind(report.created_at.timestamp_millis())
        .bind(serde_json::to_string(&report.config)?)
        .bind(serde_json::to_string(&report.windows)?)
        .bind(serde_json::to_string(&report.aggregate)?)
        .bind(report.aggregate.mean_accuracy)
        .bind(report.aggregate.recommendation.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to save walk-forward report")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WalkForwardReport>> {
        let row = sqlx::query("SELECT * FROM walk_forward_reports WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_model(&self, model_id: Uuid) -> Result<Vec<WalkForwardReport>> {
        let rows = sqlx::query(
            "SELECT * FROM walk_forward_reports WHERE model_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(model_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM walk_forward_reports WHERE model_id = ?")
            .bind(model_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
