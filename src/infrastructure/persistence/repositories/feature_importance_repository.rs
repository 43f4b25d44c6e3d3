use super::parse_uuid;
use crate::domain::model::FeatureImportance;
use crate::domain::repositories::FeatureImportanceRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub struct SqliteFeatureImportanceRepository {
    pool: SqlitePool,
}

impl SqliteFeatureImportanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeatureImportanceRepository for SqliteFeatureImportanceRepository {
    async fn save_all(&self, run_id: Uuid, importances: &[FeatureImportance]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM feature_importances WHERE training_run_id = ?")
            .bind(run_id.to_string())
            .execute(&mut *tx)
            .await?;

        for fi in importances {
            sqlx::query(
                r#"
                INSERT INTO feature_importances
                (training_run_id, feature_name, feature_index, importance, rank)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id.to_string())
            .bind(&fi.feature_name)
            .bind(fi.feature_index as i64)
            .bind(fi.importance)
            .bind(fi.rank as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to save feature importance")?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_run(&self, run_id: Uuid) -> Result<Vec<FeatureImportance>> {
        let rows =
            sqlx::query("SELECT * FROM feature_importances WHERE training_run_id = ? ORDER BY rank ASC")
                .bind(run_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let mut importances = Vec::with_capacity(rows.len());
        for row in rows {
            let run: String = row.try_get("training_run_id")?;
            importances.push(FeatureImportance {
                training_run_id: parse_uuid(&run)?,
                feature_name: row.try_get("feature_name")?,
                feature_index: row.try_get::<i64, _>("feature_index")? as usize,
                importance: row.try_get("importance")?,
                rank: row.try_get::<i64, _>("rank")? as usize,
            });
        }
        Ok(importances)
    }

    async fn delete_by_runs(&self, run_ids: &[Uuid]) -> Result<u64> {
        let mut removed = 0;
        for id in run_ids {
            let result = sqlx::query("DELETE FROM feature_importances WHERE training_run_id = ?")
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}
