use super::trainer::{Trainer, TrainingOutcome};
use crate::application::dataset::DatasetSplit;
use crate::application::jobs::CancellationFlag;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, DataRange, Hyperparameters, RunPurpose, TrainingRun};
use crate::domain::repositories::{ArtifactStore, TrainingRunRepository};
use anyhow::anyhow;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One fit to execute and record.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub model_id: Uuid,
    pub run_id: Uuid,
    pub algorithm: AlgorithmKind,
    pub lookback: usize,
    pub purpose: RunPurpose,
    pub hyperparameters: Hyperparameters,
    pub data_range: Option<DataRange>,
}

impl TrainingRequest {
    pub fn start_run(&self, split: &DatasetSplit) -> TrainingRun {
        TrainingRun::start(
            self.run_id,
            self.model_id,
            self.purpose,
            self.hyperparameters.clone(),
            self.data_range,
            split.boundaries,
        )
    }
}

/// Persists training runs around the CPU-bound `Trainer`.
///
/// Every fit that passes the quality gate leaves exactly one run row,
/// finished as Completed, Failed or Cancelled.
pub struct TrainingService {
    runs: Arc<dyn TrainingRunRepository>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl TrainingService {
    pub fn new(runs: Arc<dyn TrainingRunRepository>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { runs, artifacts }
    }

    pub async fn execute(
        &self,
        request: TrainingRequest,
        split: DatasetSplit,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<TrainingRun> {
        // Bad data never produces a run row.
        Trainer::check_quality(&split)?;

        let run = request.start_run(&split);
        self.open_run(&run).await?;

        let trainer = Trainer::new(request.algorithm, request.lookback);
        let hp = request.hyperparameters.clone();
        let flag = cancel.clone();
        let result = tokio::task::spawn_blocking(move || trainer.train(&split, &hp, &flag))
            .await
            .unwrap_or_else(|e| {
                Err(LifecycleError::Storage(anyhow!(
                    "training task for run {} panicked: {}",
                    request.run_id,
                    e
                )))
            });

        self.close_run(run, result).await
    }

    pub async fn open_run(&self, run: &TrainingRun) -> LifecycleResult<()> {
        self.runs.insert(run).await?;
        info!(
            "TrainingService: run {} started for model {} ({:?})",
            run.id, run.model_id, run.purpose
        );
        Ok(())
    }

    /// Stores the artifact of a successful fit and finishes the run. A
    /// failed fit is recorded with its partial loss trace and the original
    /// error is returned.
    pub async fn close_run(
        &self,
        mut run: TrainingRun,
        result: LifecycleResult<TrainingOutcome>,
    ) -> LifecycleResult<TrainingRun> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_failure(&mut run, &err).await?;
                return Err(err);
            }
        };

        let stored = match self.artifacts.put(&outcome.blob).await {
            Ok(stored) if stored.checksum == outcome.checksum => stored,
            Ok(stored) => {
                let err = LifecycleError::ArtifactIntegrity {
                    checksum: outcome.checksum.clone(),
                    reason: format!("store returned checksum {}", stored.checksum),
                };
                self.record_failure(&mut run, &err).await?;
                return Err(err);
            }
            Err(e) => {
                let err = LifecycleError::Storage(e.context("storing artifact"));
                self.record_failure(&mut run, &err).await?;
                return Err(err);
            }
        };

        run.complete(
            outcome.loss_trace,
            outcome.train_metrics,
            outcome.validation_metrics,
            outcome.test_metrics,
            stored.checksum,
        );
        self.runs.finish(&run).await?;
        info!(
            "TrainingService: run {} completed in {}ms (test accuracy {:?}, artifact {} bytes)",
            run.id,
            run.duration_ms.unwrap_or(0),
            run.test_accuracy(),
            stored.size_bytes
        );
        Ok(run)
    }

    async fn record_failure(&self, run: &mut TrainingRun, err: &LifecycleError) -> LifecycleResult<()> {
        let trace = err.loss_trace().to_vec();
        match err {
            LifecycleError::Cancelled { .. } => run.cancel(trace),
            other => run.fail(other.to_string(), trace),
        }
        warn!(
            "TrainingService: run {} for model {} ended {}: {}",
            run.id, run.model_id, run.status, err
        );
        self.runs.finish(run).await?;
        Ok(())
    }
}
