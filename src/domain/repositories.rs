//! Repository Pattern Abstractions
//!
//! The registry is the system of record for models and everything they own.
//! Business logic only talks to these traits; storage is either the
//! in-memory arena (`infrastructure::repositories`) or SQLite
//! (`infrastructure::persistence`).
//!
//! # Ownership
//!
//! A model owns its training runs, walk-forward reports and performance
//! samples. Feature importances hang off a training run. Artifact blobs are
//! content-addressed and referenced by checksum from the run that produced
//! them.

use crate::domain::market::Candle;
use crate::domain::model::{
    ArtifactRef, FeatureImportance, Model, ModelFilter, ModelStatus, PerformanceSample,
    TrainingRun, WalkForwardReport,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn insert(&self, model: &Model) -> Result<()>;

    /// Overwrite an existing model row.
    async fn update(&self, model: &Model) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Model>>;

    async fn list(&self, filter: &ModelFilter) -> Result<Vec<Model>>;

    /// Returns false when no such model existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Atomically move `id` to `new_status` if its current status is one of
    /// `expected`. Returns the status it had before the swap, or `None` when
    /// the swap did not happen.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: &[ModelStatus],
        new_status: ModelStatus,
    ) -> Result<Option<ModelStatus>>;
}

#[async_trait]
pub trait TrainingRunRepository: Send + Sync {
    /// Persist a freshly started (running) run.
    async fn insert(&self, run: &TrainingRun) -> Result<()>;

    /// Store the final state of a run. Fails if the stored run is already
    /// finished; finished runs are immutable.
    async fn finish(&self, run: &TrainingRun) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<TrainingRun>>;

    /// All runs of a model, oldest first.
    async fn find_by_model(&self, model_id: Uuid) -> Result<Vec<TrainingRun>>;

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait WalkForwardReportRepository: Send + Sync {
    async fn save(&self, report: &WalkForwardReport) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<WalkForwardReport>>;

    /// All reports of a model, oldest first.
    async fn find_by_model(&self, model_id: Uuid) -> Result<Vec<WalkForwardReport>>;

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait FeatureImportanceRepository: Send + Sync {
    /// Replace the importances stored for `run_id`.
    async fn save_all(&self, run_id: Uuid, importances: &[FeatureImportance]) -> Result<()>;

    /// Importances of a run ordered by rank.
    async fn find_by_run(&self, run_id: Uuid) -> Result<Vec<FeatureImportance>>;

    async fn delete_by_runs(&self, run_ids: &[Uuid]) -> Result<u64>;
}

#[async_trait]
pub trait PerformanceSampleRepository: Send + Sync {
    /// Append a sample; returns its storage id.
    async fn append(&self, sample: &PerformanceSample) -> Result<i64>;

    /// The `limit` most recent samples of a model, in chronological order.
    async fn recent(&self, model_id: Uuid, limit: usize) -> Result<Vec<PerformanceSample>>;

    async fn count(&self, model_id: Uuid) -> Result<usize>;

    /// Drop samples older than `cutoff`; returns how many were removed.
    async fn prune_before(&self, model_id: Uuid, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64>;
}

/// Content-addressed blob store for fitted artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `blob` under its checksum. Idempotent.
    async fn put(&self, blob: &[u8]) -> Result<ArtifactRef>;

    async fn get(&self, checksum: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, checksum: &str) -> Result<bool>;
}

/// Persistent bar history
#[async_trait]
pub trait CandleRepository: Send + Sync {
    async fn save(&self, candle: &Candle) -> Result<()>;

    async fn get_range(&self, symbol: &str, start_ts: i64, end_ts: i64) -> Result<Vec<Candle>>;

    async fn prune(&self, days_retention: i64) -> Result<u64>;
}
