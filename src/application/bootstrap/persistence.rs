use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::application::registry::RegistryStores;
use crate::config::StorageEnvConfig;
use crate::domain::ports::BarSource;
use crate::domain::repositories::{ArtifactStore, CandleRepository};
use crate::infrastructure::artifact_store::FsArtifactStore;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::{
    SqliteCandleRepository, SqliteFeatureImportanceRepository, SqliteModelRepository,
    SqlitePerformanceSampleRepository, SqliteTrainingRunRepository,
    SqliteWalkForwardReportRepository,
};
use crate::infrastructure::repositories::{
    InMemoryArtifactStore, InMemoryBarSource, InMemoryFeatureImportanceRepository,
    InMemoryModelRepository, InMemoryPerformanceSampleRepository, InMemoryTrainingRunRepository,
    InMemoryWalkForwardReportRepository,
};

pub struct PersistenceHandle {
    /// `None` when running on the in-memory stores.
    pub db: Option<Database>,
    pub stores: RegistryStores,
    pub candle_repository: Arc<dyn CandleRepository>,
    pub bar_source: Arc<dyn BarSource>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(storage: &StorageEnvConfig) -> Result<PersistenceHandle> {
        let artifacts: Arc<dyn ArtifactStore> = match &storage.artifact_dir {
            Some(dir) => {
                info!("Artifact store at {}", dir);
                Arc::new(
                    FsArtifactStore::new(dir)
                        .await
                        .context("Failed to initialize artifact store")?,
                )
            }
            None => Arc::new(InMemoryArtifactStore::new()),
        };

        let Some(db_url) = &storage.database_url else {
            info!("No DATABASE_URL set, using in-memory registry");
            return Ok(Self::in_memory(artifacts));
        };

        info!("Initializing Database at {}", db_url);
        let db = Database::new(db_url)
            .await
            .context("Failed to initialize database")?;

        let candles = Arc::new(SqliteCandleRepository::new(db.pool.clone()));
        let stores = RegistryStores {
            models: Arc::new(SqliteModelRepository::new(db.pool.clone())),
            runs: Arc::new(SqliteTrainingRunRepository::new(db.pool.clone())),
            reports: Arc::new(SqliteWalkForwardReportRepository::new(db.pool.clone())),
            importances: Arc::new(SqliteFeatureImportanceRepository::new(db.pool.clone())),
            samples: Arc::new(SqlitePerformanceSampleRepository::new(db.pool.clone())),
            artifacts,
        };

        Ok(PersistenceHandle {
            db: Some(db),
            stores,
            candle_repository: candles.clone(),
            bar_source: candles,
        })
    }

    pub fn in_memory(artifacts: Arc<dyn ArtifactStore>) -> PersistenceHandle {
        let bars = Arc::new(InMemoryBarSource::new());
        PersistenceHandle {
            db: None,
            stores: RegistryStores {
                models: Arc::new(InMemoryModelRepository::new()),
                runs: Arc::new(InMemoryTrainingRunRepository::new()),
                reports: Arc::new(InMemoryWalkForwardReportRepository::new()),
                importances: Arc::new(InMemoryFeatureImportanceRepository::new()),
                samples: Arc::new(InMemoryPerformanceSampleRepository::new()),
                artifacts,
            },
            candle_repository: bars.clone(),
            bar_source: bars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_to_in_memory() {
        let handle = PersistenceBootstrap::init(&StorageEnvConfig::default())
            .await
            .unwrap();
        assert!(handle.db.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_memory_url() {
        let storage = StorageEnvConfig {
            database_url: Some("sqlite::memory:".to_string()),
            artifact_dir: None,
        };
        let handle = PersistenceBootstrap::init(&storage).await.unwrap();
        assert!(handle.db.is_some());
        assert!(handle.stores.models.list(&Default::default()).await.unwrap().is_empty());
    }
}
