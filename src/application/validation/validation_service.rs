use super::walk_forward::WalkForwardValidator;
use crate::application::dataset::{Dataset, DatasetSplit};
use crate::application::jobs::CancellationFlag;
use crate::application::training::{TrainingOutcome, TrainingService};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{
    DataRange, Hyperparameters, RunPurpose, TrainingRun, WalkForwardReport, WindowConfig,
};
use crate::domain::repositories::WalkForwardReportRepository;
use crate::domain::validation::data_quality::StrictBarValidator;
use anyhow::anyhow;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub model_id: Uuid,
    pub report_id: Uuid,
    pub hyperparameters: Hyperparameters,
    pub data_range: Option<DataRange>,
    pub config: WindowConfig,
}

/// Runs a walk-forward validation and records one training run per window
/// plus the final report. Any failed window fails the whole validation.
pub struct ValidationService {
    training: Arc<TrainingService>,
    reports: Arc<dyn WalkForwardReportRepository>,
}

impl ValidationService {
    pub fn new(
        training: Arc<TrainingService>,
        reports: Arc<dyn WalkForwardReportRepository>,
    ) -> Self {
        Self { training, reports }
    }

    pub async fn execute(
        &self,
        validator: WalkForwardValidator,
        request: ValidationRequest,
        dataset: Dataset,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<WalkForwardReport> {
        let windows = validator.windows(&dataset, &request.config)?;
        if let Some((row, col)) = StrictBarValidator::first_non_finite(&dataset.rows) {
            return Err(LifecycleError::data_quality(format!(
                "non-finite {} value at row {}",
                dataset.feature_names.get(col).map(String::as_str).unwrap_or("?"),
                row
            )));
        }

        let splits = WalkForwardValidator::splits(&dataset, &windows);
        let runs: Vec<TrainingRun> = windows
            .iter()
            .zip(&splits)
            .map(|(w, split)| {
                TrainingRun::start(
                    Uuid::new_v4(),
                    request.model_id,
                    RunPurpose::WalkForwardWindow {
                        report_id: request.report_id,
                        index: w.index,
                    },
                    request.hyperparameters.clone(),
                    request.data_range,
                    split.boundaries,
                )
            })
            .collect();

        info!(
            "ValidationService: model {} walk-forward over {} rows, {} windows ({})",
            request.model_id,
            dataset.len(),
            windows.len(),
            if validator.is_parallel() { "parallel" } else { "sequential" }
        );

        let finished = if validator.is_parallel() {
            self.run_parallel(validator, &request, &splits, &runs, cancel)
                .await?
        } else {
            self.run_sequential(validator, &request, &splits, &runs, cancel)
                .await?
        };

        let window_results = windows
            .iter()
            .zip(&splits)
            .zip(&finished)
            .map(|((w, split), run)| {
                WalkForwardValidator::window_result(
                    w,
                    split,
                    run.test_metrics.unwrap_or_default(),
                    run.id,
                )
            })
            .collect();

        let report =
            validator.build_report(request.report_id, request.model_id, request.config, window_results);
        self.reports.save(&report).await?;
        info!(
            "ValidationService: report {} for model {}: mean {:.3}, std {:.3}, consistency {:.3} -> {}",
            report.id,
            report.model_id,
            report.aggregate.mean_accuracy,
            report.aggregate.std_accuracy,
            report.aggregate.consistency,
            report.aggregate.recommendation
        );
        Ok(report)
    }

    async fn run_sequential(
        &self,
        validator: WalkForwardValidator,
        request: &ValidationRequest,
        splits: &[DatasetSplit],
        runs: &[TrainingRun],
        cancel: &CancellationFlag,
    ) -> LifecycleResult<Vec<TrainingRun>> {
        let mut finished = Vec::with_capacity(splits.len());
        for (split, run) in splits.iter().zip(runs) {
            self.training.open_run(run).await?;

            let split_owned = split.clone();
            let hp = request.hyperparameters.clone();
            let flag = cancel.clone();
            let result = tokio::task::spawn_blocking(move || {
                validator.train_window(&split_owned, &hp, &flag)
            })
            .await
            .unwrap_or_else(|e| Err(LifecycleError::Storage(anyhow!("window task panicked: {}", e))));

            finished.push(self.close_window(run, result).await?);
        }
        Ok(finished)
    }

    async fn run_parallel(
        &self,
        validator: WalkForwardValidator,
        request: &ValidationRequest,
        splits: &[DatasetSplit],
        runs: &[TrainingRun],
        cancel: &CancellationFlag,
    ) -> LifecycleResult<Vec<TrainingRun>> {
        for run in runs {
            self.training.open_run(run).await?;
        }

        let splits_owned = splits.to_vec();
        let hp = request.hyperparameters.clone();
        let flag = cancel.clone();
        let results = tokio::task::spawn_blocking(move || {
            validator.train_windows(&splits_owned, &hp, &flag)
        })
        .await
        .map_err(|e| LifecycleError::Storage(anyhow!("window pool panicked: {}", e)))?;

        // Every opened run gets closed before the first error is reported.
        let mut finished = Vec::with_capacity(runs.len());
        let mut first_error = None;
        for (run, result) in runs.iter().zip(results) {
            match self.close_window(run, result).await {
                Ok(closed) => finished.push(closed),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(finished),
        }
    }

    /// Finishes the window's run; the stored run carries the test metrics.
    async fn close_window(
        &self,
        run: &TrainingRun,
        result: LifecycleResult<TrainingOutcome>,
    ) -> LifecycleResult<TrainingRun> {
        if let Err(e) = &result {
            warn!("ValidationService: window run {} failed: {}", run.id, e);
        }
        self.training.close_run(run.clone(), result).await
    }
}
