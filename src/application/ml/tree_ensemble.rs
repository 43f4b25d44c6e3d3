use super::estimator::{FitContext, FittedModel, ModelEstimator};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, Hyperparameters};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Random forest regressor on 0/1 labels; the averaged leaf value is the
/// probability of an up move.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsembleEstimator {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
}

impl Default for TreeEnsembleEstimator {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 5,
        }
    }
}

impl TreeEnsembleEstimator {
    pub fn from_hyperparameters(hp: &Hyperparameters) -> Self {
        let d = Self::default();
        Self {
            n_trees: hp.get_usize("n_trees", d.n_trees),
            max_depth: hp.get_u64("max_depth", d.max_depth as u64).min(u16::MAX as u64) as u16,
            min_samples_split: hp.get_usize("min_samples_split", d.min_samples_split),
        }
    }
}

fn to_dense(features: &Array2<f64>) -> LifecycleResult<DenseMatrix<f64>> {
    let rows: Vec<Vec<f64>> = features.outer_iter().map(|r| r.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows)
        .map_err(|e| LifecycleError::invalid_config(format!("Matrix creation failed: {}", e)))
}

impl ModelEstimator for TreeEnsembleEstimator {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::TreeEnsemble
    }

    fn fit(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        ctx: &mut FitContext<'_>,
    ) -> LifecycleResult<FittedModel> {
        if features.nrows() == 0 {
            return Err(LifecycleError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        if self.n_trees == 0 {
            return Err(LifecycleError::invalid_config("n_trees must be at least 1"));
        }
        ctx.checkpoint()?;

        let x = to_dense(features)?;
        let y = labels.to_vec();
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split);

        let forest = Forest::fit(&x, &y, params).map_err(|e| {
            LifecycleError::ConvergenceFailure {
                iterations: 0,
                reason: format!("random forest fit failed: {}", e),
                loss_trace: Vec::new(),
            }
        })?;
        ctx.checkpoint()?;

        let state = TreeEnsembleState { forest };
        // A forest has no iterations; its in-sample squared error is the trace.
        let fitted = state.predict_proba(features)?;
        let mse = fitted
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        ctx.record_loss(mse)?;

        Ok(FittedModel::TreeEnsemble(state))
    }
}

#[derive(Serialize, Deserialize)]
pub struct TreeEnsembleState {
    pub forest: Forest,
}

impl fmt::Debug for TreeEnsembleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeEnsembleState").finish_non_exhaustive()
    }
}

impl TreeEnsembleState {
    pub fn predict_proba(&self, features: &Array2<f64>) -> LifecycleResult<Vec<f64>> {
        if features.nrows() == 0 {
            return Ok(Vec::new());
        }
        let x = to_dense(features)?;
        let scores = self
            .forest
            .predict(&x)
            .map_err(|e| LifecycleError::invalid_config(format!("Prediction failed: {}", e)))?;
        Ok(scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::jobs::CancellationFlag;

    #[test]
    fn test_forest_fits_threshold_rule() {
        let xs: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let x = Array2::from_shape_vec((60, 1), xs.clone()).unwrap();
        let y = Array1::from(xs.iter().map(|v| f64::from(u8::from(*v >= 30.0))).collect::<Vec<_>>());

        let flag = CancellationFlag::new();
        let mut ctx = FitContext::new(&flag);
        let est = TreeEnsembleEstimator {
            n_trees: 10,
            max_depth: 4,
            min_samples_split: 2,
        };
        let model = est.fit(&x, &y, &mut ctx).unwrap();
        assert_eq!(ctx.loss_trace().len(), 1);

        let probe = Array2::from_shape_vec((2, 1), vec![2.0, 57.0]).unwrap();
        let p = model.predict_proba(&probe).unwrap();
        assert!(p[0] < 0.5);
        assert!(p[1] > 0.5);
    }

    #[test]
    fn test_max_depth_from_hyperparameters() {
        let est =
            TreeEnsembleEstimator::from_hyperparameters(&Hyperparameters::new().with("max_depth", 3));
        assert_eq!(est.max_depth, 3);
        assert_eq!(est.n_trees, 50);
    }
}
