use crate::application::dataset::Dataset;
use crate::application::ml::Artifact;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::FeatureImportance;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use tracing::debug;
use uuid::Uuid;

/// Permutation importance: how much test accuracy drops when one feature
/// column is shuffled.
#[derive(Debug, Clone, Copy)]
pub struct FeatureImportanceAnalyzer {
    n_repeats: usize,
}

impl Default for FeatureImportanceAnalyzer {
    fn default() -> Self {
        Self { n_repeats: 5 }
    }
}

/// Shuffle seed for one (model, feature, repeat) triple. Never shared
/// between features or repeats.
pub fn permutation_seed(model_id: Uuid, feature_name: &str, repeat: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(feature_name.as_bytes());
    hasher.update((repeat as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

impl FeatureImportanceAnalyzer {
    pub fn new(n_repeats: usize) -> Self {
        Self { n_repeats }
    }

    pub fn n_repeats(&self) -> usize {
        self.n_repeats
    }

    /// Importances for every artifact feature, ranked 1..n by descending
    /// importance (ties broken by feature index).
    pub fn compute(
        &self,
        model_id: Uuid,
        training_run_id: Uuid,
        artifact: &Artifact,
        dataset: &Dataset,
    ) -> LifecycleResult<Vec<FeatureImportance>> {
        if self.n_repeats == 0 {
            return Err(LifecycleError::invalid_config("n_repeats must be at least 1"));
        }
        if dataset.is_empty() {
            return Err(LifecycleError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let baseline = artifact.evaluate(dataset)?.accuracy;

        let scores: Vec<LifecycleResult<f64>> = (0..dataset.width())
            .into_par_iter()
            .map(|index| self.column_importance(model_id, artifact, dataset, index, baseline))
            .collect();

        let mut importances = Vec::with_capacity(scores.len());
        for (index, score) in scores.into_iter().enumerate() {
            importances.push(FeatureImportance {
                training_run_id,
                feature_name: dataset.feature_names[index].clone(),
                feature_index: index,
                importance: score?,
                rank: 0,
            });
        }

        importances.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(Ordering::Equal)
                .then(a.feature_index.cmp(&b.feature_index))
        });
        for (pos, imp) in importances.iter_mut().enumerate() {
            imp.rank = pos + 1;
        }

        debug!(
            "FeatureImportance: run {} baseline {:.3}, top feature {:?}",
            training_run_id,
            baseline,
            importances.first().map(|i| i.feature_name.as_str())
        );
        Ok(importances)
    }

    fn column_importance(
        &self,
        model_id: Uuid,
        artifact: &Artifact,
        dataset: &Dataset,
        index: usize,
        baseline: f64,
    ) -> LifecycleResult<f64> {
        let name = &dataset.feature_names[index];
        let original = dataset.column(index);
        let mut permuted = dataset.clone();
        let mut total_drop = 0.0;

        for repeat in 0..self.n_repeats {
            let mut rng = StdRng::seed_from_u64(permutation_seed(model_id, name, repeat));
            let mut column = original.clone();
            column.shuffle(&mut rng);
            permuted.set_column(index, &column);

            let accuracy = artifact.evaluate(&permuted)?.accuracy;
            total_drop += (baseline - accuracy).max(0.0);
        }

        Ok((total_drop / self.n_repeats as f64).clamp(0.0, 1.0))
    }
}
