use crate::application::ml::Artifact;
use crate::application::monitoring::{DriftAssessment, DriftMonitor};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::events::LifecycleEvent;
use crate::domain::model::{
    ChildModelSpec, FeatureImportance, Model, ModelFilter, ModelStatus, NewModel,
    PerformanceSample, Recommendation, RunStatus, TrainingRun, WalkForwardReport,
};
use crate::domain::repositories::{
    ArtifactStore, FeatureImportanceRepository, ModelRepository, PerformanceSampleRepository,
    TrainingRunRepository, WalkForwardReportRepository,
};
use crate::infrastructure::event_bus::EventBus;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Storage handles the registry writes through.
#[derive(Clone)]
pub struct RegistryStores {
    pub models: Arc<dyn ModelRepository>,
    pub runs: Arc<dyn TrainingRunRepository>,
    pub reports: Arc<dyn WalkForwardReportRepository>,
    pub importances: Arc<dyn FeatureImportanceRepository>,
    pub samples: Arc<dyn PerformanceSampleRepository>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// Promotion gates and sample retention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistryPolicy {
    pub min_test_accuracy: f64,
    pub min_promotion_tier: Recommendation,
    pub sample_retention_hours: i64,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            min_test_accuracy: 0.50,
            min_promotion_tier: Recommendation::Marginal,
            sample_retention_hours: 24 * 30,
        }
    }
}

/// System of record for models, their runs, reports and live samples.
///
/// Every write to a model row happens under that model's lock, so sample
/// ingestion, promotion and status changes are serialized per model.
pub struct ModelRegistry {
    stores: RegistryStores,
    event_bus: EventBus,
    policy: RegistryPolicy,
    drift: DriftMonitor,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ModelRegistry {
    pub fn new(
        stores: RegistryStores,
        event_bus: EventBus,
        policy: RegistryPolicy,
        drift: DriftMonitor,
    ) -> Self {
        Self {
            stores,
            event_bus,
            policy,
            drift,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn stores(&self) -> &RegistryStores {
        &self.stores
    }

    pub fn policy(&self) -> &RegistryPolicy {
        &self.policy
    }

    async fn lock_model(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    async fn save(&self, model: &mut Model) -> LifecycleResult<()> {
        model.updated_at = Utc::now();
        self.stores.models.update(model).await?;
        Ok(())
    }

    // ----- models -----

    pub async fn create_model(&self, spec: NewModel) -> LifecycleResult<Model> {
        if spec.name.trim().is_empty() {
            return Err(LifecycleError::invalid_config("model name must not be empty"));
        }
        if spec.symbols.is_empty() || spec.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(LifecycleError::invalid_config(
                "a model needs at least one non-empty symbol",
            ));
        }
        let model = Model::new(spec);
        self.stores.models.insert(&model).await?;
        info!(
            "Registry: created model {} '{}' ({} on {:?})",
            model.id, model.name, model.algorithm, model.symbols
        );
        Ok(model)
    }

    /// Derives a Draft model from `parent_id`; unset fields are inherited.
    pub async fn create_child(
        &self,
        parent_id: Uuid,
        spec: ChildModelSpec,
    ) -> LifecycleResult<Model> {
        let parent = self.get_model(parent_id).await?;
        let child = Model::child_of(&parent, spec);
        self.stores.models.insert(&child).await?;
        info!(
            "Registry: created model {} '{}' as child of {}",
            child.id, child.name, parent.id
        );
        Ok(child)
    }

    pub async fn get_model(&self, id: Uuid) -> LifecycleResult<Model> {
        self.stores
            .models
            .get(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("model", id))
    }

    pub async fn list_models(&self, filter: &ModelFilter) -> LifecycleResult<Vec<Model>> {
        Ok(self.stores.models.list(filter).await?)
    }

    /// Ancestors of `id`, nearest first. Missing ancestors end the chain.
    pub async fn lineage(&self, id: Uuid) -> LifecycleResult<Vec<Model>> {
        let model = self.get_model(id).await?;
        let mut seen = HashSet::from([model.id]);
        let mut chain = Vec::new();
        let mut next = model.parent_id;

        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                warn!("Registry: lineage cycle at model {}", parent_id);
                break;
            }
            match self.stores.models.get(parent_id).await? {
                Some(parent) => {
                    next = parent.parent_id;
                    chain.push(parent);
                }
                None => break,
            }
        }
        Ok(chain)
    }

    pub async fn children(&self, id: Uuid) -> LifecycleResult<Vec<Model>> {
        let filter = ModelFilter {
            parent_id: Some(id),
            ..Default::default()
        };
        self.list_models(&filter).await
    }

    /// Removes the model and everything it owns. Children keep their
    /// (now dangling) `parent_id`.
    pub async fn delete_model(&self, id: Uuid) -> LifecycleResult<()> {
        let _guard = self.lock_model(id).await;
        let model = self.get_model(id).await?;
        if model.status == ModelStatus::Training {
            return Err(LifecycleError::Conflict { model_id: id });
        }

        let runs = self.stores.runs.find_by_model(id).await?;
        let run_ids: Vec<Uuid> = runs.iter().map(|r| r.id).collect();
        let mut checksums: HashSet<String> =
            runs.iter().filter_map(|r| r.artifact_checksum.clone()).collect();
        checksums.extend(model.active_artifact.clone());

        let importances = self.stores.importances.delete_by_runs(&run_ids).await?;
        for checksum in &checksums {
            self.stores.artifacts.delete(checksum).await?;
        }
        let reports = self.stores.reports.delete_by_model(id).await?;
        let samples = self.stores.samples.delete_by_model(id).await?;
        let deleted_runs = self.stores.runs.delete_by_model(id).await?;
        self.stores.models.delete(id).await?;

        self.locks.lock().await.remove(&id);
        info!(
            "Registry: deleted model {} ({} runs, {} reports, {} importances, {} samples, {} artifacts)",
            id,
            deleted_runs,
            reports,
            importances,
            samples,
            checksums.len()
        );
        Ok(())
    }

    // ----- status machine -----

    /// Claims the model for a training or validation job. Returns the
    /// status to restore if the job fails recoverably.
    pub async fn begin_training(&self, id: Uuid) -> LifecycleResult<ModelStatus> {
        let _guard = self.lock_model(id).await;
        let swapped = self
            .stores
            .models
            .compare_and_set_status(id, ModelStatus::trainable(), ModelStatus::Training)
            .await?;
        if let Some(prior) = swapped {
            return Ok(prior);
        }

        let model = self.get_model(id).await?;
        if model.status == ModelStatus::Training {
            Err(LifecycleError::Conflict { model_id: id })
        } else {
            Err(LifecycleError::InvalidTransition {
                model_id: id,
                from: model.status,
                to: ModelStatus::Training,
            })
        }
    }

    /// Applies a job's outcome: success moves to Validated, recoverable
    /// errors restore `prior`, anything else fails the model.
    pub async fn finish_training(
        &self,
        id: Uuid,
        prior: ModelStatus,
        error: Option<&LifecycleError>,
    ) -> LifecycleResult<Model> {
        let _guard = self.lock_model(id).await;
        let mut model = self.get_model(id).await?;
        if model.status != ModelStatus::Training {
            return Err(LifecycleError::InvalidTransition {
                model_id: id,
                from: model.status,
                to: ModelStatus::Validated,
            });
        }

        let next = match error {
            None => ModelStatus::Validated,
            Some(e) if e.preserves_prior_status() && model.status.can_roll_back_to(prior) => prior,
            Some(_) => ModelStatus::Failed,
        };
        model.status = next;
        self.save(&mut model).await?;
        info!("Registry: model {} training finished -> {}", id, next);
        Ok(model)
    }

    /// Makes `run_id` the model's live artifact. Nothing changes when any
    /// gate rejects the run.
    pub async fn promote(&self, model_id: Uuid, run_id: Uuid) -> LifecycleResult<Model> {
        let _guard = self.lock_model(model_id).await;
        let mut model = self.get_model(model_id).await?;
        let reject = |reason: String| LifecycleError::InvalidPromotion {
            model_id,
            run_id,
            reason,
        };

        if !model.status.can_transition_to(ModelStatus::Active) {
            return Err(reject(format!("model is {}", model.status)));
        }
        let run = self
            .stores
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("training run", run_id))?;
        if run.model_id != model_id {
            return Err(reject(format!("run belongs to model {}", run.model_id)));
        }
        if run.status != RunStatus::Completed {
            return Err(reject(format!("run is {}", run.status)));
        }
        let accuracy = run
            .test_accuracy()
            .ok_or_else(|| reject("run has no test metrics".to_string()))?;
        if accuracy < self.policy.min_test_accuracy {
            return Err(reject(format!(
                "test accuracy {:.3} below minimum {:.3}",
                accuracy, self.policy.min_test_accuracy
            )));
        }
        let checksum = run
            .artifact_checksum
            .clone()
            .ok_or_else(|| reject("run has no artifact".to_string()))?;
        if self.stores.artifacts.get(&checksum).await?.is_none() {
            return Err(reject(format!("artifact {} missing from store", checksum)));
        }

        let reports = self.stores.reports.find_by_model(model_id).await?;
        if !reports
            .iter()
            .any(|r| r.passes(self.policy.min_promotion_tier))
        {
            return Err(reject(format!(
                "no walk-forward report at or above {}",
                self.policy.min_promotion_tier
            )));
        }

        model.status = ModelStatus::Active;
        model.active_run_id = Some(run_id);
        model.active_artifact = Some(checksum.clone());
        model.baseline_accuracy = Some(accuracy);
        model.drift_detected = false;
        model.drift_detected_at = None;
        model.drift_recovery_streak = 0;
        self.save(&mut model).await?;

        info!(
            "Registry: model {} promoted run {} (baseline {:.3})",
            model_id, run_id, accuracy
        );
        self.event_bus
            .publish(LifecycleEvent::ModelPromoted {
                model_id,
                run_id,
                artifact: checksum,
            })
            .await;
        Ok(model)
    }

    pub async fn archive(&self, id: Uuid) -> LifecycleResult<Model> {
        let _guard = self.lock_model(id).await;
        let mut model = self.get_model(id).await?;
        if !model.status.can_transition_to(ModelStatus::Archived) {
            return Err(LifecycleError::InvalidTransition {
                model_id: id,
                from: model.status,
                to: ModelStatus::Archived,
            });
        }
        model.status = ModelStatus::Archived;
        self.save(&mut model).await?;
        info!("Registry: model {} archived", id);
        self.event_bus
            .publish(LifecycleEvent::ModelArchived { model_id: id })
            .await;
        Ok(model)
    }

    pub async fn fail(&self, id: Uuid, reason: &str) -> LifecycleResult<Model> {
        let _guard = self.lock_model(id).await;
        let mut model = self.get_model(id).await?;
        if !model.status.can_transition_to(ModelStatus::Failed) {
            return Err(LifecycleError::InvalidTransition {
                model_id: id,
                from: model.status,
                to: ModelStatus::Failed,
            });
        }
        model.status = ModelStatus::Failed;
        self.save(&mut model).await?;
        warn!("Registry: model {} marked failed: {}", id, reason);
        Ok(model)
    }

    // ----- live performance -----

    /// Appends a live sample, prunes past the retention horizon and runs
    /// drift evaluation, all under the model's lock.
    pub async fn record_sample(
        &self,
        model_id: Uuid,
        sample: PerformanceSample,
    ) -> LifecycleResult<DriftAssessment> {
        if !sample.accuracy.is_finite() || !(0.0..=1.0).contains(&sample.accuracy) {
            return Err(LifecycleError::invalid_config(format!(
                "sample accuracy must be within [0, 1], got {}",
                sample.accuracy
            )));
        }

        let _guard = self.lock_model(model_id).await;
        let mut model = self.get_model(model_id).await?;

        let sample = PerformanceSample { model_id, ..sample };
        self.stores.samples.append(&sample).await?;

        let cutoff = sample.timestamp - Duration::hours(self.policy.sample_retention_hours);
        let pruned = self.stores.samples.prune_before(model_id, cutoff).await?;
        if pruned > 0 {
            info!("Registry: pruned {} expired samples of model {}", pruned, model_id);
        }

        let recent = self
            .stores
            .samples
            .recent(model_id, self.drift.config().window_size)
            .await?;
        let assessment = self.drift.evaluate(&model, &recent, Utc::now());
        if DriftMonitor::apply(&mut model, &assessment) {
            self.stores.models.update(&model).await?;
        }

        if let Some(event) = DriftMonitor::event_for(&assessment) {
            self.event_bus.publish(event).await;
        }
        Ok(assessment)
    }

    // ----- runs, reports, importances, artifacts -----

    pub async fn get_run(&self, run_id: Uuid) -> LifecycleResult<TrainingRun> {
        self.stores
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("training run", run_id))
    }

    pub async fn runs_of(&self, model_id: Uuid) -> LifecycleResult<Vec<TrainingRun>> {
        Ok(self.stores.runs.find_by_model(model_id).await?)
    }

    pub async fn reports_of(&self, model_id: Uuid) -> LifecycleResult<Vec<WalkForwardReport>> {
        Ok(self.stores.reports.find_by_model(model_id).await?)
    }

    pub async fn save_importances(
        &self,
        run_id: Uuid,
        importances: &[FeatureImportance],
    ) -> LifecycleResult<()> {
        self.stores.importances.save_all(run_id, importances).await?;
        Ok(())
    }

    pub async fn importances_of(&self, run_id: Uuid) -> LifecycleResult<Vec<FeatureImportance>> {
        Ok(self.stores.importances.find_by_run(run_id).await?)
    }

    pub async fn load_artifact(&self, checksum: &str) -> LifecycleResult<Artifact> {
        let blob = self
            .stores
            .artifacts
            .get(checksum)
            .await?
            .ok_or_else(|| LifecycleError::not_found("artifact", checksum))?;
        Artifact::from_blob(&blob, checksum)
    }
}
