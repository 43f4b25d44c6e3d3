//! In-Memory Repository Implementations
//!
//! Arena-style tables keyed by generated ids, implementing every trait in
//! `domain::repositories`.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Ordered**: Rows keep insertion order, so "oldest first" queries are stable
//! - **Testing**: Ideal for unit tests and the CLI's dry runs
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - Limited by available RAM
//!
//! For persistence use the SQLite repositories in `infrastructure::persistence`.

use crate::domain::market::Candle;
use crate::domain::model::{
    ArtifactRef, DataRange, FeatureImportance, Model, ModelFilter, ModelStatus, PerformanceSample,
    TrainingRun, WalkForwardReport,
};
use crate::domain::ports::BarSource;
use crate::domain::repositories::{
    ArtifactStore, CandleRepository, FeatureImportanceRepository, ModelRepository,
    PerformanceSampleRepository, TrainingRunRepository, WalkForwardReportRepository,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of ModelRepository
pub struct InMemoryModelRepository {
    models: Arc<RwLock<Vec<Model>>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryModelRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn insert(&self, model: &Model) -> Result<()> {
        let mut models = self.models.write().await;
        if models.iter().any(|m| m.id == model.id) {
            bail!("model {} already exists", model.id);
        }
        models.push(model.clone());
        Ok(())
    }

    async fn update(&self, model: &Model) -> Result<()> {
        let mut models = self.models.write().await;
        match models.iter_mut().find(|m| m.id == model.id) {
            Some(slot) => {
                *slot = model.clone();
                Ok(())
            }
            None => bail!("model {} does not exist", model.id),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Model>> {
        Ok(self.models.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn list(&self, filter: &ModelFilter) -> Result<Vec<Model>> {
        let models = self.models.read().await;
        Ok(models.iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut models = self.models.write().await;
        let before = models.len();
        models.retain(|m| m.id != id);
        Ok(models.len() != before)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: &[ModelStatus],
        new_status: ModelStatus,
    ) -> Result<Option<ModelStatus>> {
        let mut models = self.models.write().await;
        let Some(model) = models.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if !expected.contains(&model.status) {
            return Ok(None);
        }
        let prior = model.status;
        model.status = new_status;
        model.updated_at = Utc::now();
        Ok(Some(prior))
    }
}

/// In-memory implementation of TrainingRunRepository
pub struct InMemoryTrainingRunRepository {
    runs: Arc<RwLock<Vec<TrainingRun>>>,
}

impl InMemoryTrainingRunRepository {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryTrainingRunRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrainingRunRepository for InMemoryTrainingRunRepository {
    async fn insert(&self, run: &TrainingRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.iter().any(|r| r.id == run.id) {
            bail!("training run {} already exists", run.id);
        }
        runs.push(run.clone());
        Ok(())
    }

    async fn finish(&self, run: &TrainingRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        let Some(slot) = runs.iter_mut().find(|r| r.id == run.id) else {
            bail!("training run {} does not exist", run.id);
        };
        if slot.is_finished() {
            bail!("training run {} is already {}", run.id, slot.status);
        }
        *slot = run.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TrainingRun>> {
        Ok(self.runs.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_model(&self, model_id: Uuid) -> Result<Vec<TrainingRun>> {
        let runs = self.runs.read().await;
        let mut found: Vec<TrainingRun> =
            runs.iter().filter(|r| r.model_id == model_id).cloned().collect();
        found.sort_by_key(|r| r.started_at);
        Ok(found)
    }

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64> {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|r| r.model_id != model_id);
        Ok((before - runs.len()) as u64)
    }
}

/// In-memory implementation of WalkForwardReportRepository
pub struct InMemoryWalkForwardReportRepository {
    reports: Arc<RwLock<Vec<WalkForwardReport>>>,
}

impl InMemoryWalkForwardReportRepository {
    pub fn new() -> Self {
        Self {
            reports: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryWalkForwardReportRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalkForwardReportRepository for InMemoryWalkForwardReportRepository {
    async fn save(&self, report: &WalkForwardReport) -> Result<()> {
        let mut reports = self.reports.write().await;
        match reports.iter_mut().find(|r| r.id == report.id) {
            Some(slot) => *slot = report.clone(),
            None => reports.push(report.clone()),
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WalkForwardReport>> {
        Ok(self.reports.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_model(&self, model_id: Uuid) -> Result<Vec<WalkForwardReport>> {
        let reports = self.reports.read().await;
        let mut found: Vec<WalkForwardReport> = reports
            .iter()
            .filter(|r| r.model_id == model_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64> {
        let mut reports = self.reports.write().await;
        let before = reports.len();
        reports.retain(|r| r.model_id != model_id);
        Ok((before - reports.len()) as u64)
    }
}

/// In-memory implementation of FeatureImportanceRepository
pub struct InMemoryFeatureImportanceRepository {
    by_run: Arc<RwLock<HashMap<Uuid, Vec<FeatureImportance>>>>,
}

impl InMemoryFeatureImportanceRepository {
    pub fn new() -> Self {
        Self {
            by_run: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryFeatureImportanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeatureImportanceRepository for InMemoryFeatureImportanceRepository {
    async fn save_all(&self, run_id: Uuid, importances: &[FeatureImportance]) -> Result<()> {
        let mut sorted = importances.to_vec();
        sorted.sort_by_key(|i| i.rank);
        self.by_run.write().await.insert(run_id, sorted);
        Ok(())
    }

    async fn find_by_run(&self, run_id: Uuid) -> Result<Vec<FeatureImportance>> {
        Ok(self
            .by_run
            .read()
            .await
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_by_runs(&self, run_ids: &[Uuid]) -> Result<u64> {
        let mut by_run = self.by_run.write().await;
        let mut removed = 0u64;
        for id in run_ids {
            if let Some(rows) = by_run.remove(id) {
                removed += rows.len() as u64;
            }
        }
        Ok(removed)
    }
}

/// In-memory implementation of PerformanceSampleRepository
pub struct InMemoryPerformanceSampleRepository {
    samples: Arc<RwLock<Vec<PerformanceSample>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryPerformanceSampleRepository {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }
}

impl Default for InMemoryPerformanceSampleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PerformanceSampleRepository for InMemoryPerformanceSampleRepository {
    async fn append(&self, sample: &PerformanceSample) -> Result<i64> {
        let id = {
            let mut next = self.next_id.write().await;
            let id = *next;
            *next += 1;
            id
        };
        self.samples.write().await.push(PerformanceSample {
            id: Some(id),
            ..sample.clone()
        });
        Ok(id)
    }

    async fn recent(&self, model_id: Uuid, limit: usize) -> Result<Vec<PerformanceSample>> {
        let samples = self.samples.read().await;
        let mut recent: Vec<PerformanceSample> = samples
            .iter()
            .rev()
            .filter(|s| s.model_id == model_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn count(&self, model_id: Uuid) -> Result<usize> {
        Ok(self
            .samples
            .read()
            .await
            .iter()
            .filter(|s| s.model_id == model_id)
            .count())
    }

    async fn prune_before(&self, model_id: Uuid, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut samples = self.samples.write().await;
        let before = samples.len();
        samples.retain(|s| s.model_id != model_id || s.timestamp >= cutoff);
        Ok((before - samples.len()) as u64)
    }

    async fn delete_by_model(&self, model_id: Uuid) -> Result<u64> {
        let mut samples = self.samples.write().await;
        let before = samples.len();
        samples.retain(|s| s.model_id != model_id);
        Ok((before - samples.len()) as u64)
    }
}

/// Content-addressed blobs held in a map
pub struct InMemoryArtifactStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, blob: &[u8]) -> Result<ArtifactRef> {
        let reference = ArtifactRef::for_blob(blob);
        self.blobs
            .write()
            .await
            .entry(reference.checksum.clone())
            .or_insert_with(|| blob.to_vec());
        Ok(reference)
    }

    async fn get(&self, checksum: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(checksum).cloned())
    }

    async fn delete(&self, checksum: &str) -> Result<bool> {
        Ok(self.blobs.write().await.remove(checksum).is_some())
    }
}

/// Bars held per symbol; doubles as a `BarSource` for tests and CSV imports.
pub struct InMemoryBarSource {
    bars: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
}

impl InMemoryBarSource {
    pub fn new() -> Self {
        Self {
            bars: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replaces the bars of `symbol`; they are kept sorted by timestamp.
    pub async fn insert_bars(&self, symbol: &str, mut bars: Vec<Candle>) {
        bars.sort_by_key(|b| b.timestamp);
        self.bars.write().await.insert(symbol.to_string(), bars);
    }
}

impl Default for InMemoryBarSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarSource for InMemoryBarSource {
    async fn load_bars(&self, symbol: &str, range: DataRange) -> Result<Vec<Candle>> {
        let bars = self.bars.read().await;
        Ok(bars
            .get(symbol)
            .map(|all| {
                all.iter()
                    .filter(|b| range.contains(b.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CandleRepository for InMemoryBarSource {
    async fn save(&self, candle: &Candle) -> Result<()> {
        let mut bars = self.bars.write().await;
        let series = bars.entry(candle.symbol.clone()).or_default();
        match series.binary_search_by_key(&candle.timestamp, |b| b.timestamp) {
            Ok(i) => series[i] = candle.clone(),
            Err(i) => series.insert(i, candle.clone()),
        }
        Ok(())
    }

    async fn get_range(&self, symbol: &str, start_ts: i64, end_ts: i64) -> Result<Vec<Candle>> {
        self.load_bars(symbol, DataRange::new(start_ts, end_ts)).await
    }

    async fn prune(&self, days_retention: i64) -> Result<u64> {
        let cutoff = Utc::now().timestamp_millis() - days_retention * 24 * 3_600_000;
        let mut bars = self.bars.write().await;
        let mut removed = 0u64;
        for series in bars.values_mut() {
            let before = series.len();
            series.retain(|b| b.timestamp >= cutoff);
            removed += (before - series.len()) as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use crate::domain::model::{AlgorithmKind, Hyperparameters, NewModel, RunPurpose, SplitBoundaries};
    use rust_decimal_macros::dec;

    fn model() -> Model {
        Model::new(NewModel {
            name: "m".to_string(),
            symbols: vec!["ETH/USDT".to_string()],
            timeframe: Timeframe::FifteenMin,
            algorithm: AlgorithmKind::TreeEnsemble,
            hyperparameters: Hyperparameters::new(),
        })
    }

    #[tokio::test]
    async fn test_compare_and_set_status() {
        let repo = InMemoryModelRepository::new();
        let m = model();
        repo.insert(&m).await.unwrap();

        let prior = repo
            .compare_and_set_status(m.id, ModelStatus::trainable(), ModelStatus::Training)
            .await
            .unwrap();
        assert_eq!(prior, Some(ModelStatus::Draft));

        // second claim loses
        let again = repo
            .compare_and_set_status(m.id, ModelStatus::trainable(), ModelStatus::Training)
            .await
            .unwrap();
        assert_eq!(again, None);
        assert_eq!(repo.get(m.id).await.unwrap().unwrap().status, ModelStatus::Training);
    }

    #[tokio::test]
    async fn test_finished_run_is_immutable() {
        let repo = InMemoryTrainingRunRepository::new();
        let mut run = TrainingRun::start(
            Uuid::new_v4(),
            Uuid::new_v4(),
            RunPurpose::Holdout,
            Hyperparameters::new(),
            None,
            SplitBoundaries::default(),
        );
        repo.insert(&run).await.unwrap();
        run.fail("boom".to_string(), vec![0.7]);
        repo.finish(&run).await.unwrap();
        assert!(repo.finish(&run).await.is_err());
    }

    #[tokio::test]
    async fn test_recent_samples_are_chronological() {
        let repo = InMemoryPerformanceSampleRepository::new();
        let id = Uuid::new_v4();
        for acc in [0.1, 0.2, 0.3, 0.4] {
            repo.append(&PerformanceSample::new(id, acc)).await.unwrap();
        }
        repo.append(&PerformanceSample::new(Uuid::new_v4(), 0.9))
            .await
            .unwrap();

        let recent = repo.recent(id, 2).await.unwrap();
        let accs: Vec<f64> = recent.iter().map(|s| s.accuracy).collect();
        assert_eq!(accs, vec![0.3, 0.4]);
        assert_eq!(repo.count(id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_artifact_store_is_content_addressed() {
        let store = InMemoryArtifactStore::new();
        let a = store.put(b"blob").await.unwrap();
        let b = store.put(b"blob").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
        assert!(store.delete(&a.checksum).await.unwrap());
        assert!(store.get(&a.checksum).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bar_source_range() {
        let source = InMemoryBarSource::new();
        for ts in [3_000, 1_000, 2_000] {
            CandleRepository::save(
                &source,
                &Candle {
                    symbol: "SOL/USDT".to_string(),
                    open: dec!(10),
                    high: dec!(11),
                    low: dec!(9),
                    close: dec!(10.5),
                    volume: dec!(100),
                    timestamp: ts,
                },
            )
            .await
            .unwrap();
        }
        let bars = source
            .load_bars("SOL/USDT", DataRange::new(1_500, 3_000))
            .await
            .unwrap();
        let ts: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![2_000, 3_000]);
    }
}
