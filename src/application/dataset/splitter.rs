use super::dataset::Dataset;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{SplitBoundaries, WindowConfig, WindowType};
use serde::{Deserialize, Serialize};
use std::ops::Range;

const RATIO_TOLERANCE: f64 = 1e-6;

/// Train / validation / test proportions of a holdout split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.6,
            validation: 0.2,
            test: 0.2,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, validation: f64, test: f64) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        let parts = [self.train, self.validation, self.test];
        if parts.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(LifecycleError::invalid_config(format!(
                "split ratios must be finite and non-negative: {:?}",
                self
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(LifecycleError::invalid_config(format!(
                "split ratios must sum to 1.0, got {:.6}",
                sum
            )));
        }
        Ok(())
    }
}

/// The three contiguous partitions of a dataset.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
    pub boundaries: SplitBoundaries,
}

/// Row slices of one walk-forward window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSlices {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Row counts derived from a `WindowConfig` for a given dataset length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub initial_train: usize,
    pub test: usize,
    pub step: usize,
}

/// Partitions datasets strictly by time. Rows are never shuffled.
pub struct DatasetSplitter;

impl DatasetSplitter {
    /// `train_end = round(n * train)`, `validation_end = round(n * (train +
    /// validation))`, test gets the remainder.
    pub fn simple_split(dataset: &Dataset, ratios: SplitRatios) -> LifecycleResult<DatasetSplit> {
        ratios.validate()?;
        let n = dataset.len();
        let train_end = ((n as f64 * ratios.train).round() as usize).min(n);
        let validation_end =
            ((n as f64 * (ratios.train + ratios.validation)).round() as usize).clamp(train_end, n);

        Ok(Self::partition(dataset, 0..train_end, train_end..validation_end, validation_end..n))
    }

    /// Converts fractions to row counts once; everything after is integer
    /// arithmetic.
    pub fn plan(n: usize, config: &WindowConfig) -> LifecycleResult<WindowPlan> {
        let fractions = [
            ("initial_train_fraction", config.initial_train_fraction),
            ("test_fraction", config.test_fraction),
            ("step_fraction", config.step_fraction),
        ];
        for (name, f) in fractions {
            if !f.is_finite() || f <= 0.0 || f > 1.0 {
                return Err(LifecycleError::invalid_config(format!(
                    "{} must be in (0, 1], got {}",
                    name, f
                )));
            }
        }

        let rows = |f: f64| ((n as f64 * f).round() as usize).max(1);
        let plan = WindowPlan {
            initial_train: rows(config.initial_train_fraction),
            test: rows(config.test_fraction),
            step: rows(config.step_fraction),
        };

        if plan.step < plan.test {
            return Err(LifecycleError::invalid_config(format!(
                "step ({} rows) shorter than test slice ({} rows) would overlap test windows",
                plan.step, plan.test
            )));
        }
        Ok(plan)
    }

    pub fn walk_forward_windows(
        n: usize,
        config: &WindowConfig,
    ) -> LifecycleResult<Vec<WindowSlices>> {
        let plan = Self::plan(n, config)?;
        let mut windows = Vec::new();

        for k in 0.. {
            let train_end = plan.initial_train + k * plan.step;
            let test_end = train_end + plan.test;
            if test_end > n {
                break;
            }
            let train_start = match config.window_type {
                WindowType::Expanding => 0,
                WindowType::Rolling => k * plan.step,
            };
            windows.push(WindowSlices {
                index: k,
                train: train_start..train_end,
                test: train_end..test_end,
            });
        }

        if windows.is_empty() {
            return Err(LifecycleError::InsufficientWindows {
                rows: n,
                reason: format!(
                    "initial train {} + test {} rows exceed the dataset",
                    plan.initial_train, plan.test
                ),
            });
        }
        Ok(windows)
    }

    /// Train/test datasets of one window; the validation partition is empty.
    pub fn window_split(dataset: &Dataset, window: &WindowSlices) -> DatasetSplit {
        let empty = window.train.end..window.train.end;
        Self::partition(dataset, window.train.clone(), empty, window.test.clone())
    }

    fn partition(
        dataset: &Dataset,
        train: Range<usize>,
        validation: Range<usize>,
        test: Range<usize>,
    ) -> DatasetSplit {
        DatasetSplit {
            boundaries: SplitBoundaries {
                train: dataset.row_range(&train),
                validation: dataset.row_range(&validation),
                test: dataset.row_range(&test),
            },
            train: dataset.slice(train),
            validation: dataset.slice(validation),
            test: dataset.slice(test),
        }
    }
}
