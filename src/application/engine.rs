//! Lifecycle engine facade
//!
//! The single entry point external callers use: model registration,
//! background training and walk-forward jobs, predictions from the active
//! artifact, live outcome ingestion and status queries.
//!
//! # Jobs
//!
//! `train_model` and `validate_model` claim the model through the registry's
//! status compare-and-swap before anything is spawned, so a second request
//! for the same model fails fast with `Conflict`. The returned `JobHandle`
//! carries the run or report id up front.

use crate::application::analysis::FeatureImportanceAnalyzer;
use crate::application::dataset::{Dataset, DatasetSplitter};
use crate::application::features::FeatureBuilder;
use crate::application::jobs::{CancellationFlag, JobHandle};
use crate::application::ml::Artifact;
use crate::application::monitoring::{DriftAssessment, DriftMonitor, DriftState};
use crate::application::registry::{ModelRegistry, RegistryStores};
use crate::application::training::{TrainingRequest, TrainingService};
use crate::application::validation::{ValidationRequest, ValidationService, WalkForwardValidator};
use crate::config::EngineConfig;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::events::LifecycleEvent;
use crate::domain::market::Candle;
use crate::domain::model::{
    ChildModelSpec, DataRange, FeatureImportance, Model, ModelFilter, ModelStatus, NewModel,
    PerformanceSample, RunPurpose, RunStatus, TrainingRun, WalkForwardAggregate,
    WalkForwardReport, WindowConfig,
};
use crate::domain::ports::BarSource;
use crate::domain::validation::data_quality::StrictBarValidator;
use crate::infrastructure::event_bus::EventBus;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trading action derived from the up-probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for PredictionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionAction::Buy => write!(f, "BUY"),
            PredictionAction::Sell => write!(f, "SELL"),
            PredictionAction::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model_id: Uuid,
    pub action: PredictionAction,
    pub probability_up: f64,
    /// `|p - 0.5| * 2`, in [0, 1].
    pub confidence: f64,
    /// Timestamp of the bar the prediction was made on.
    pub bar_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub purpose: RunPurpose,
    pub status: RunStatus,
    pub test_accuracy: Option<f64>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&TrainingRun> for RunSummary {
    fn from(run: &TrainingRun) -> Self {
        Self {
            run_id: run.id,
            purpose: run.purpose,
            status: run.status,
            test_accuracy: run.test_accuracy(),
            failure_reason: run.failure_reason.clone(),
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub report_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub window_count: usize,
    pub aggregate: WalkForwardAggregate,
}

impl From<&WalkForwardReport> for ReportSummary {
    fn from(report: &WalkForwardReport) -> Self {
        Self {
            report_id: report.id,
            created_at: report.created_at,
            window_count: report.windows.len(),
            aggregate: report.aggregate,
        }
    }
}

/// Everything a caller polling a model wants to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatusView {
    pub model: Model,
    /// Most recent holdout run, if any.
    pub latest_run: Option<RunSummary>,
    pub latest_report: Option<ReportSummary>,
    pub drift_state: DriftState,
    /// Live samples currently retained for drift evaluation.
    pub sample_count: usize,
}

/// Facade over the registry, training and validation services.
///
/// Cheap to clone; clones share stores, caches and the event bus.
#[derive(Clone)]
pub struct LifecycleEngine {
    registry: Arc<ModelRegistry>,
    training: Arc<TrainingService>,
    validation: Arc<ValidationService>,
    bars: Arc<dyn BarSource>,
    event_bus: EventBus,
    config: Arc<EngineConfig>,
    artifact_cache: Arc<RwLock<HashMap<String, Arc<Artifact>>>>,
}

impl LifecycleEngine {
    pub fn new(
        stores: RegistryStores,
        bars: Arc<dyn BarSource>,
        event_bus: EventBus,
        config: EngineConfig,
    ) -> Self {
        let training = Arc::new(TrainingService::new(
            stores.runs.clone(),
            stores.artifacts.clone(),
        ));
        let validation = Arc::new(ValidationService::new(
            training.clone(),
            stores.reports.clone(),
        ));
        let registry = Arc::new(ModelRegistry::new(
            stores,
            event_bus.clone(),
            config.registry.policy(),
            DriftMonitor::new(config.drift.monitor_config()),
        ));

        Self {
            registry,
            training,
            validation,
            bars,
            event_bus,
            config: Arc::new(config),
            artifact_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ----- models -----

    pub async fn create_model(&self, spec: NewModel) -> LifecycleResult<Uuid> {
        Ok(self.registry.create_model(spec).await?.id)
    }

    pub async fn create_child(
        &self,
        parent_id: Uuid,
        spec: ChildModelSpec,
    ) -> LifecycleResult<Uuid> {
        Ok(self.registry.create_child(parent_id, spec).await?.id)
    }

    pub async fn list_models(&self, filter: ModelFilter) -> LifecycleResult<Vec<Model>> {
        self.registry.list_models(&filter).await
    }

    pub async fn lineage(&self, model_id: Uuid) -> LifecycleResult<Vec<Model>> {
        self.registry.lineage(model_id).await
    }

    pub async fn promote(&self, model_id: Uuid, run_id: Uuid) -> LifecycleResult<Model> {
        self.registry.promote(model_id, run_id).await
    }

    pub async fn archive(&self, model_id: Uuid) -> LifecycleResult<Model> {
        self.registry.archive(model_id).await
    }

    pub async fn delete_model(&self, model_id: Uuid) -> LifecycleResult<()> {
        self.registry.delete_model(model_id).await?;
        // Blobs are content-addressed; dropping the whole cache is simplest.
        self.artifact_cache.write().await.clear();
        Ok(())
    }

    pub async fn get_model_status(&self, model_id: Uuid) -> LifecycleResult<ModelStatusView> {
        let model = self.registry.get_model(model_id).await?;
        let runs = self.registry.runs_of(model_id).await?;
        let reports = self.registry.reports_of(model_id).await?;

        let latest_run = runs
            .iter()
            .rev()
            .find(|r| r.purpose == RunPurpose::Holdout)
            .map(RunSummary::from);
        let latest_report = reports.last().map(ReportSummary::from);
        let sample_count = self.registry.stores().samples.count(model_id).await?;
        let drift_state = if model.drift_detected {
            DriftState::Degraded
        } else {
            DriftState::Stable
        };

        Ok(ModelStatusView {
            model,
            latest_run,
            latest_report,
            drift_state,
            sample_count,
        })
    }

    pub async fn runs(&self, model_id: Uuid) -> LifecycleResult<Vec<TrainingRun>> {
        self.registry.runs_of(model_id).await
    }

    pub async fn reports(&self, model_id: Uuid) -> LifecycleResult<Vec<WalkForwardReport>> {
        self.registry.reports_of(model_id).await
    }

    // ----- background jobs -----

    /// Starts a holdout training job on bars of the model's primary symbol.
    /// The handle's id is the training run id.
    pub async fn train_model(
        &self,
        model_id: Uuid,
        range: DataRange,
    ) -> LifecycleResult<JobHandle<Uuid>> {
        let model = self.registry.get_model(model_id).await?;
        let prior = self.registry.begin_training(model_id).await?;

        let run_id = Uuid::new_v4();
        let cancel = CancellationFlag::new();
        let engine = self.clone();
        let flag = cancel.clone();
        let handle = tokio::spawn(async move {
            engine
                .run_training_job(model, prior, run_id, range, flag)
                .await
        });

        info!(
            "Engine: training job {} started for model {} (prior status {})",
            run_id, model_id, prior
        );
        Ok(JobHandle::new(run_id, model_id, cancel, handle))
    }

    /// Starts a walk-forward validation job. The handle's id is the report id.
    pub async fn validate_model(
        &self,
        model_id: Uuid,
        range: DataRange,
        window: WindowConfig,
    ) -> LifecycleResult<JobHandle<Uuid>> {
        let model = self.registry.get_model(model_id).await?;
        let prior = self.registry.begin_training(model_id).await?;

        let report_id = Uuid::new_v4();
        let cancel = CancellationFlag::new();
        let engine = self.clone();
        let flag = cancel.clone();
        let handle = tokio::spawn(async move {
            engine
                .run_validation_job(model, prior, report_id, range, window, flag)
                .await
        });

        info!(
            "Engine: validation job {} started for model {} ({:?})",
            report_id, model_id, window.window_type
        );
        Ok(JobHandle::new(report_id, model_id, cancel, handle))
    }

    async fn run_training_job(
        self,
        model: Model,
        prior: ModelStatus,
        run_id: Uuid,
        range: DataRange,
        cancel: CancellationFlag,
    ) -> LifecycleResult<Uuid> {
        self.event_bus
            .publish(LifecycleEvent::TrainingStarted {
                model_id: model.id,
                run_id,
            })
            .await;

        let result = self.train_holdout(&model, run_id, range, &cancel).await;
        let settled = self
            .registry
            .finish_training(model.id, prior, result.as_ref().err())
            .await?;

        match result {
            Ok(run) => {
                self.event_bus
                    .publish(LifecycleEvent::TrainingCompleted {
                        model_id: model.id,
                        run_id: run.id,
                        test_accuracy: run.test_accuracy(),
                        duration_ms: run.duration_ms.unwrap_or(0),
                    })
                    .await;
                Ok(run.id)
            }
            Err(err) => {
                let recorded = self.registry.stores().runs.get(run_id).await.ok().flatten();
                warn!(
                    "Engine: training of model {} failed ({}), model is now {}",
                    model.id, err, settled.status
                );
                self.event_bus
                    .publish(LifecycleEvent::TrainingFailed {
                        model_id: model.id,
                        run_id: recorded.map(|r| r.id),
                        reason: failure_reason(&err),
                        status: settled.status,
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn train_holdout(
        &self,
        model: &Model,
        run_id: Uuid,
        range: DataRange,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<TrainingRun> {
        let lookback = self.config.features.lookback;
        let (dataset, data_range) = self.load_dataset(model, range, lookback).await?;
        let split = DatasetSplitter::simple_split(&dataset, self.config.features.split_ratios())?;
        debug!(
            "Engine: model {} split {} / {} / {} rows",
            model.id,
            split.train.len(),
            split.validation.len(),
            split.test.len()
        );

        let request = TrainingRequest {
            model_id: model.id,
            run_id,
            algorithm: model.algorithm,
            lookback,
            purpose: RunPurpose::Holdout,
            hyperparameters: model.hyperparameters.clone(),
            data_range: Some(data_range),
        };
        self.training.execute(request, split, cancel).await
    }

    async fn run_validation_job(
        self,
        model: Model,
        prior: ModelStatus,
        report_id: Uuid,
        range: DataRange,
        window: WindowConfig,
        cancel: CancellationFlag,
    ) -> LifecycleResult<Uuid> {
        let result = self
            .walk_forward(&model, report_id, range, window, &cancel)
            .await;
        let settled = self
            .registry
            .finish_training(model.id, prior, result.as_ref().err())
            .await?;

        match result {
            Ok(report) => {
                self.event_bus
                    .publish(LifecycleEvent::ValidationCompleted {
                        model_id: model.id,
                        report_id: report.id,
                        mean_accuracy: report.aggregate.mean_accuracy,
                        recommendation: report.aggregate.recommendation,
                    })
                    .await;
                Ok(report.id)
            }
            Err(err) => {
                warn!(
                    "Engine: validation of model {} failed ({}), model is now {}",
                    model.id, err, settled.status
                );
                self.event_bus
                    .publish(LifecycleEvent::TrainingFailed {
                        model_id: model.id,
                        run_id: None,
                        reason: failure_reason(&err),
                        status: settled.status,
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn walk_forward(
        &self,
        model: &Model,
        report_id: Uuid,
        range: DataRange,
        window: WindowConfig,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<WalkForwardReport> {
        let lookback = self.config.features.lookback;
        let (dataset, data_range) = self.load_dataset(model, range, lookback).await?;
        let validator = WalkForwardValidator::new(
            model.algorithm,
            lookback,
            self.config.validation.recommendation_policy(),
        )
        .with_parallel(self.config.validation.parallel);

        let request = ValidationRequest {
            model_id: model.id,
            report_id,
            hyperparameters: model.hyperparameters.clone(),
            data_range: Some(data_range),
            config: window,
        };
        self.validation
            .execute(validator, request, dataset, cancel)
            .await
    }

    /// Loads the model's bars in `range` and builds the labelled dataset off
    /// the async runtime. Returns the dataset and the actual bar span.
    async fn load_dataset(
        &self,
        model: &Model,
        range: DataRange,
        lookback: usize,
    ) -> LifecycleResult<(Dataset, DataRange)> {
        let bars = self.bars.load_bars(model.primary_symbol(), range).await?;
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(LifecycleError::InsufficientData {
                required: lookback + 1,
                available: 0,
            });
        };
        let span = DataRange::new(first.timestamp, last.timestamp);
        StrictBarValidator::validate_spacing(&bars, model.timeframe)?;
        info!(
            "Engine: loaded {} {} bars for model {}",
            bars.len(),
            model.primary_symbol(),
            model.id
        );

        let dataset = tokio::task::spawn_blocking(move || Dataset::from_bars(&bars, lookback))
            .await
            .map_err(|e| LifecycleError::Storage(anyhow!("feature task panicked: {}", e)))??;
        Ok((dataset, span))
    }

    // ----- predictions -----

    async fn artifact(&self, checksum: &str) -> LifecycleResult<Arc<Artifact>> {
        if let Some(artifact) = self.artifact_cache.read().await.get(checksum) {
            return Ok(Arc::clone(artifact));
        }
        let artifact = Arc::new(self.registry.load_artifact(checksum).await?);
        self.artifact_cache
            .write()
            .await
            .insert(checksum.to_string(), Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Scores the most recent bar of `bars` with the model's active artifact.
    pub async fn predict(&self, model_id: Uuid, bars: &[Candle]) -> LifecycleResult<Prediction> {
        let model = self.registry.get_model(model_id).await?;
        let checksum = match (&model.status, &model.active_artifact) {
            (ModelStatus::Active, Some(checksum)) => checksum.clone(),
            _ => {
                return Err(LifecycleError::ModelNotReady {
                    model_id,
                    status: model.status,
                });
            }
        };
        let artifact = self.artifact(&checksum).await?;

        StrictBarValidator::validate_spacing(bars, model.timeframe)?;
        let features = FeatureBuilder::new(artifact.lookback).build(bars)?;
        let Some(latest) = features.last() else {
            return Err(LifecycleError::InsufficientData {
                required: artifact.lookback,
                available: bars.len(),
            });
        };
        let row = vec![latest.values.clone()];
        if let Some((_, col)) = StrictBarValidator::first_non_finite(&row) {
            return Err(LifecycleError::data_quality(format!(
                "non-finite {} value in latest features",
                artifact
                    .feature_names
                    .get(col)
                    .map(String::as_str)
                    .unwrap_or("?")
            )));
        }

        let probability_up = artifact
            .predict_proba(&row)?
            .first()
            .copied()
            .unwrap_or(0.5);
        let band = self.config.features.prediction_hold_band;
        let action = if probability_up > 0.5 + band {
            PredictionAction::Buy
        } else if probability_up < 0.5 - band {
            PredictionAction::Sell
        } else {
            PredictionAction::Hold
        };

        Ok(Prediction {
            model_id,
            action,
            probability_up,
            confidence: ((probability_up - 0.5).abs() * 2.0).min(1.0),
            bar_timestamp: latest.timestamp,
        })
    }

    // ----- live monitoring -----

    pub async fn record_live_outcome(
        &self,
        model_id: Uuid,
        sample: PerformanceSample,
    ) -> LifecycleResult<DriftAssessment> {
        self.registry.record_sample(model_id, sample).await
    }

    // ----- feature importance -----

    /// Permutation importance of a completed run's artifact, evaluated on
    /// the rows of `range` that come after the run's train and validation
    /// partitions. A range with no such rows is `InsufficientData`. Results
    /// replace any stored for the run.
    pub async fn compute_feature_importance(
        &self,
        model_id: Uuid,
        run_id: Uuid,
        range: DataRange,
    ) -> LifecycleResult<Vec<FeatureImportance>> {
        let model = self.registry.get_model(model_id).await?;
        let run = self.registry.get_run(run_id).await?;
        if run.model_id != model_id {
            return Err(LifecycleError::not_found("training run of model", run_id));
        }
        let checksum = match (&run.status, &run.artifact_checksum) {
            (RunStatus::Completed, Some(checksum)) => checksum.clone(),
            _ => {
                return Err(LifecycleError::invalid_config(format!(
                    "run {} is {} and has no usable artifact",
                    run_id, run.status
                )));
            }
        };
        let artifact = self.artifact(&checksum).await?;
        let (dataset, _) = self.load_dataset(&model, range, artifact.lookback).await?;
        let evaluation = rows_after_fit(&dataset, &run)?;

        let analyzer = FeatureImportanceAnalyzer::new(self.config.features.importance_repeats);
        let importances = tokio::task::spawn_blocking(move || {
            analyzer.compute(model_id, run_id, &artifact, &evaluation)
        })
        .await
        .map_err(|e| LifecycleError::Storage(anyhow!("importance task panicked: {}", e)))??;

        self.registry.save_importances(run_id, &importances).await?;
        if let Some(top) = importances.first() {
            info!(
                "Engine: importance for run {} computed, top feature {} ({:.4})",
                run_id, top.feature_name, top.importance
            );
        }
        Ok(importances)
    }

    pub async fn feature_importances(&self, run_id: Uuid) -> LifecycleResult<Vec<FeatureImportance>> {
        self.registry.importances_of(run_id).await
    }
}

/// Rows of `dataset` the run's fit never saw: everything after its train
/// and validation partitions.
fn rows_after_fit(dataset: &Dataset, run: &TrainingRun) -> LifecycleResult<Dataset> {
    let seen_until = [
        run.splits.train.last_timestamp,
        run.splits.validation.last_timestamp,
    ]
    .into_iter()
    .flatten()
    .max();
    let start = match seen_until {
        Some(last) => dataset.timestamps.partition_point(|ts| *ts <= last),
        None => 0,
    };
    if start >= dataset.len() {
        return Err(LifecycleError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    Ok(dataset.slice(start..dataset.len()))
}

fn failure_reason(err: &LifecycleError) -> String {
    match err {
        LifecycleError::Cancelled { .. } => "cancelled".to_string(),
        other => other.to_string(),
    }
}
