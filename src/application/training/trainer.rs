use crate::application::dataset::{Dataset, DatasetSplit};
use crate::application::jobs::CancellationFlag;
use crate::application::ml::{Artifact, FeatureScaler, FitContext, estimator_for};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, ClassificationMetrics, Hyperparameters, checksum_of};
use crate::domain::validation::data_quality::StrictBarValidator;
use chrono::Utc;
use ndarray::Array1;
use tracing::debug;

/// Result of a successful fit, ready to be persisted.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifact: Artifact,
    pub blob: Vec<u8>,
    pub checksum: String,
    pub loss_trace: Vec<f64>,
    pub train_metrics: ClassificationMetrics,
    pub validation_metrics: Option<ClassificationMetrics>,
    pub test_metrics: Option<ClassificationMetrics>,
}

/// Fits one estimator on a split and scores it on every partition.
///
/// Purely computational; persistence is the caller's business.
#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    algorithm: AlgorithmKind,
    lookback: usize,
}

impl Trainer {
    pub fn new(algorithm: AlgorithmKind, lookback: usize) -> Self {
        Self {
            algorithm,
            lookback,
        }
    }

    /// Rejects splits that must not reach an estimator.
    pub fn check_quality(split: &DatasetSplit) -> LifecycleResult<()> {
        if split.train.is_empty() {
            return Err(LifecycleError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        let partitions = [
            ("train", &split.train),
            ("validation", &split.validation),
            ("test", &split.test),
        ];
        for (name, part) in partitions {
            if let Some((row, col)) = StrictBarValidator::first_non_finite(&part.rows) {
                let feature = part
                    .feature_names
                    .get(col)
                    .map(String::as_str)
                    .unwrap_or("?");
                return Err(LifecycleError::data_quality(format!(
                    "non-finite {} value in {} partition at row {} (value {})",
                    feature, name, row, part.rows[row][col]
                )));
            }
        }
        Ok(())
    }

    pub fn train(
        &self,
        split: &DatasetSplit,
        hyperparameters: &Hyperparameters,
        cancel: &CancellationFlag,
    ) -> LifecycleResult<TrainingOutcome> {
        Self::check_quality(split)?;

        let scaler = FeatureScaler::fit(&split.train.rows)?;
        let x_train = scaler.transform(&split.train.rows)?;
        let y_train = Array1::from_iter(split.train.labels.iter().map(|l| f64::from(*l)));

        let estimator = estimator_for(self.algorithm, hyperparameters);
        let mut ctx = FitContext::new(cancel);
        let model = estimator.fit(&x_train, &y_train, &mut ctx)?;
        let loss_trace = ctx.into_loss_trace();

        let artifact = Artifact {
            algorithm: self.algorithm,
            feature_names: split.train.feature_names.clone(),
            lookback: self.lookback,
            scaler,
            model,
            created_at: Utc::now(),
        };

        let score = |part: &Dataset| -> LifecycleResult<Option<ClassificationMetrics>> {
            if part.is_empty() {
                Ok(None)
            } else {
                artifact.evaluate(part).map(Some)
            }
        };
        let train_metrics = artifact.evaluate(&split.train)?;
        let validation_metrics = score(&split.validation)?;
        let test_metrics = score(&split.test)?;

        let blob = artifact.to_blob()?;
        let checksum = checksum_of(&blob);
        debug!(
            "Trainer: {} fit on {} rows, train acc {:.3}, artifact {}",
            self.algorithm.as_str(),
            split.train.len(),
            train_metrics.accuracy,
            checksum
        );

        Ok(TrainingOutcome {
            artifact,
            blob,
            checksum,
            loss_trace,
            train_metrics,
            validation_metrics,
            test_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dataset::{DatasetSplitter, SplitRatios};
    use crate::application::test_support::{random_walk_bars, zigzag_bars};

    fn split(bars: usize) -> DatasetSplit {
        let ds = Dataset::from_bars(&zigzag_bars(bars), 10).unwrap();
        DatasetSplitter::simple_split(&ds, SplitRatios::default()).unwrap()
    }

    #[test]
    fn test_linear_learns_zigzag() {
        let outcome = Trainer::new(AlgorithmKind::Linear, 10)
            .train(&split(200), &Hyperparameters::new(), &CancellationFlag::new())
            .unwrap();
        assert!(outcome.test_metrics.unwrap().accuracy > 0.9);
        assert!(outcome.validation_metrics.is_some());
        assert_eq!(outcome.loss_trace.len(), 300);
        assert_eq!(outcome.checksum, checksum_of(&outcome.blob));
    }

    #[test]
    fn test_every_algorithm_produces_an_artifact() {
        let s = split(160);
        let hp = Hyperparameters::new()
            .with("n_trees", 5)
            .with("epochs", 30)
            .with("max_iterations", 30);
        for kind in [
            AlgorithmKind::Linear,
            AlgorithmKind::TreeEnsemble,
            AlgorithmKind::Neural,
        ] {
            let outcome = Trainer::new(kind, 10)
                .train(&s, &hp, &CancellationFlag::new())
                .unwrap();
            assert_eq!(outcome.artifact.model.kind(), kind);
            let restored = Artifact::from_blob(&outcome.blob, &outcome.checksum).unwrap();
            assert_eq!(restored.algorithm, kind);
        }
    }

    #[test]
    fn test_non_finite_feature_rejected_before_fit() {
        let mut s = split(120);
        s.test.rows[3][2] = f64::INFINITY;
        let err = Trainer::new(AlgorithmKind::Linear, 10)
            .train(&s, &Hyperparameters::new(), &CancellationFlag::new())
            .unwrap_err();
        match err {
            LifecycleError::DataQuality { reason } => assert!(reason.contains("test partition")),
            other => panic!("expected DataQuality, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_fit() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let err = Trainer::new(AlgorithmKind::Neural, 10)
            .train(&split(120), &Hyperparameters::new(), &cancel)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Cancelled { .. }));
    }

    #[test]
    fn test_random_walk_trains_without_error() {
        let ds = Dataset::from_bars(&random_walk_bars(150, 7), 20).unwrap();
        let s = DatasetSplitter::simple_split(&ds, SplitRatios::default()).unwrap();
        let outcome = Trainer::new(AlgorithmKind::Linear, 20)
            .train(&s, &Hyperparameters::new(), &CancellationFlag::new())
            .unwrap();
        assert!(outcome.train_metrics.samples > 0);
    }
}
