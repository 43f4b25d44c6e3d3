use crate::application::dataset::{Dataset, DatasetSplit, DatasetSplitter, WindowSlices};
use crate::application::jobs::CancellationFlag;
use crate::application::training::{Trainer, TrainingOutcome};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{
    AlgorithmKind, ClassificationMetrics, Hyperparameters, RecommendationPolicy, WalkForwardAggregate, WalkForwardReport,
    WindowConfig, WindowResult,
};
use chrono::Utc;
use rayon::prelude::*;
use statrs::statistics::Statistics;
use tracing::info;
use uuid::Uuid;

/// Out-of-sample validation over successive time windows.
///
/// Each window trains on its own train slice (no validation partition) and
/// is scored only on the test slice that follows it.
#[derive(Debug, Clone, Copy)]
pub struct WalkForwardValidator {
    trainer: Trainer,
    policy: RecommendationPolicy,
    parallel: bool,
}

impl WalkForwardValidator {
    pub fn new(algorithm: AlgorithmKind, lookback: usize, policy: RecommendationPolicy) -> Self {
        Self {
            trainer: Trainer::new(algorithm, lookback),
            policy,
            parallel: false,
        }
    }

    /// Train windows on the rayon pool. Aggregates are identical to the
    /// sequential mode.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn windows(&self, dataset: &Dataset, config: &WindowConfig) -> LifecycleResult<Vec<WindowSlices>> {
        DatasetSplitter::walk_forward_windows(dataset.len(), config)
    }

    pub fn splits(dataset: &Dataset, windows: &[WindowSlices]) -> Vec<DatasetSplit> {
        windows
            .iter()
            .map(|w| DatasetSplitter::window_split(dataset, w))
            .collect()
    }

    pub fn train_window(
        &self,
        split: &DatasetSplit,
        hyperparameters: &Hyperparameters,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<TrainingOutcome> {
        if cancel.is_cancelled() {
            return Err(LifecycleError::Cancelled {
                iterations: 0,
                loss_trace: Vec::new(),
            });
        }
        self.trainer.train(split, hyperparameters, cancel)
    }

    /// One result per split, in window order. The sequential mode stops at
    /// the first failure, so the result list may be shorter than `splits`.
    pub fn train_windows(
        &self,
        splits: &[DatasetSplit],
        hyperparameters: &Hyperparameters,
        cancel: &CancellationFlag,
    ) -> Vec<LifecycleResult<TrainingOutcome>> {
        if self.parallel {
            return splits
                .par_iter()
                .map(|s| self.train_window(s, hyperparameters, cancel))
                .collect();
        }

        let mut results = Vec::with_capacity(splits.len());
        for split in splits {
            let result = self.train_window(split, hyperparameters, cancel);
            let failed = result.is_err();
            results.push(result);
            if failed {
                break;
            }
        }
        results
    }

    pub fn window_result(
        window: &WindowSlices,
        split: &DatasetSplit,
        test: ClassificationMetrics,
        training_run_id: Uuid,
    ) -> WindowResult {
        WindowResult {
            index: window.index,
            train_range: split.boundaries.train,
            test_range: split.boundaries.test,
            accuracy: test.accuracy,
            precision: test.precision,
            recall: test.recall,
            f1: test.f1,
            training_run_id,
        }
    }

    pub fn aggregate(&self, windows: &[WindowResult]) -> WalkForwardAggregate {
        let accuracies: Vec<f64> = windows.iter().map(|w| w.accuracy).collect();
        if accuracies.is_empty() {
            return WalkForwardAggregate {
                mean_accuracy: 0.0,
                std_accuracy: 0.0,
                min_accuracy: 0.0,
                max_accuracy: 0.0,
                consistency: 0.0,
                recommendation: self.policy.classify(0.0, 0.0),
            };
        }

        let mean = accuracies.iter().mean();
        let std = accuracies.iter().population_std_dev();
        let min = accuracies.iter().copied().fold(f64::INFINITY, f64::min);
        let max = accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let consistency = if mean > 0.0 {
            (1.0 - std / mean).max(0.0)
        } else {
            0.0
        };

        WalkForwardAggregate {
            mean_accuracy: mean,
            std_accuracy: std,
            min_accuracy: min,
            max_accuracy: max,
            consistency,
            recommendation: self.policy.classify(mean, consistency),
        }
    }

    pub fn build_report(
        &self,
        report_id: Uuid,
        model_id: Uuid,
        config: WindowConfig,
        mut windows: Vec<WindowResult>,
    ) -> WalkForwardReport {
        windows.sort_by_key(|w| w.index);
        let aggregate = self.aggregate(&windows);
        WalkForwardReport {
            id: report_id,
            model_id,
            created_at: Utc::now(),
            config,
            windows,
            aggregate,
        }
    }

    /// Runs every window in memory and returns the report. Window run ids
    /// are fresh and not persisted.
    pub fn validate(
        &self,
        model_id: Uuid,
        dataset: &Dataset,
        hyperparameters: &Hyperparameters,
        config: &WindowConfig,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<WalkForwardReport> {
        let windows = self.windows(dataset, config)?;
        let splits = Self::splits(dataset, &windows);
        let results = self.train_windows(&splits, hyperparameters, cancel);

        let mut window_results = Vec::with_capacity(windows.len());
        for ((window, split), result) in windows.iter().zip(&splits).zip(results) {
            let outcome = result?;
            let test = outcome.test_metrics.unwrap_or_default();
            window_results.push(Self::window_result(window, split, test, Uuid::new_v4()));
        }

        let report = self.build_report(Uuid::new_v4(), model_id, *config, window_results);
        info!(
            "WalkForward: {} windows, mean accuracy {:.3}, consistency {:.3} -> {}",
            report.windows.len(),
            report.aggregate.mean_accuracy,
            report.aggregate.consistency,
            report.aggregate.recommendation
        );
        Ok(report)
    }
}
