use super::estimator::FittedModel;
use super::scaler::FeatureScaler;
use crate::application::dataset::Dataset;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, ClassificationMetrics, checksum_of};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything needed to score new bars: scaler, fitted state and the
/// feature layout it was trained on. Serialised as JSON and stored under the
/// SHA-256 of that blob.
#[derive(Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub algorithm: AlgorithmKind,
    pub feature_names: Vec<String>,
    pub lookback: usize,
    pub scaler: FeatureScaler,
    pub model: FittedModel,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn to_blob(&self) -> LifecycleResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| LifecycleError::Storage(anyhow::anyhow!("artifact serialization: {}", e)))
    }

    /// Decodes a blob after checking it hashes to `expected_checksum`.
    pub fn from_blob(blob: &[u8], expected_checksum: &str) -> LifecycleResult<Self> {
        let actual = checksum_of(blob);
        if actual != expected_checksum {
            return Err(LifecycleError::ArtifactIntegrity {
                checksum: expected_checksum.to_string(),
                reason: format!("content hashes to {}", actual),
            });
        }
        serde_json::from_slice(blob).map_err(|e| LifecycleError::ArtifactIntegrity {
            checksum: expected_checksum.to_string(),
            reason: format!("undecodable blob: {}", e),
        })
    }

    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> LifecycleResult<Vec<f64>> {
        let x = self.scaler.transform(rows)?;
        self.model.predict_proba(&x)
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> LifecycleResult<Vec<u8>> {
        let x = self.scaler.transform(rows)?;
        self.model.predict(&x)
    }

    pub fn evaluate(&self, dataset: &Dataset) -> LifecycleResult<ClassificationMetrics> {
        if dataset.feature_names != self.feature_names {
            return Err(LifecycleError::invalid_config(
                "dataset feature layout differs from the artifact's",
            ));
        }
        let predicted = self.predict(&dataset.rows)?;
        Ok(ClassificationMetrics::from_labels(&predicted, &dataset.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::linear::LinearState;

    fn artifact() -> Artifact {
        Artifact {
            algorithm: AlgorithmKind::Linear,
            feature_names: vec!["a".to_string(), "b".to_string()],
            lookback: 5,
            scaler: FeatureScaler {
                means: vec![0.0, 0.0],
                stds: vec![1.0, 1.0],
            },
            model: FittedModel::Linear(LinearState {
                weights: vec![2.0, 0.0],
                bias: 0.0,
            }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_blob_round_trip_checks_integrity() {
        let blob = artifact().to_blob().unwrap();
        let checksum = checksum_of(&blob);
        let restored = Artifact::from_blob(&blob, &checksum).unwrap();
        assert_eq!(restored.algorithm, AlgorithmKind::Linear);
        assert_eq!(restored.predict(&[vec![1.0, 0.0]]).unwrap(), vec![1]);

        let mut tampered = blob.clone();
        tampered[0] = b' ';
        assert!(matches!(
            Artifact::from_blob(&tampered, &checksum),
            Err(LifecycleError::ArtifactIntegrity { .. })
        ));
    }

    #[test]
    fn test_evaluate_scores_dataset() {
        let ds = Dataset::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 0.0], vec![-1.0, 0.0], vec![2.0, 0.0], vec![-3.0, 0.0]],
            vec![1, 0, 0, 0],
            vec![1, 2, 3, 4],
        )
        .unwrap();
        let m = artifact().evaluate(&ds).unwrap();
        assert_eq!(m.samples, 4);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
    }
}
