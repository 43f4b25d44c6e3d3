use super::estimator::{FitContext, FittedModel, ModelEstimator, log_loss, sigmoid};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, Hyperparameters};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// L2-regularised logistic regression trained by batch gradient descent.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearEstimator {
    pub learning_rate: f64,
    pub max_iterations: usize,
    pub l2: f64,
}

impl Default for LinearEstimator {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iterations: 300,
            l2: 1e-3,
        }
    }
}

impl LinearEstimator {
    pub fn from_hyperparameters(hp: &Hyperparameters) -> Self {
        let d = Self::default();
        Self {
            learning_rate: hp.get_f64("learning_rate", d.learning_rate),
            max_iterations: hp.get_usize("max_iterations", d.max_iterations),
            l2: hp.get_f64("l2", d.l2),
        }
    }
}

impl ModelEstimator for LinearEstimator {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Linear
    }

    fn fit(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        ctx: &mut FitContext<'_>,
    ) -> LifecycleResult<FittedModel> {
        let (n, d) = features.dim();
        if n == 0 {
            return Err(LifecycleError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        if self.max_iterations == 0 || self.learning_rate <= 0.0 {
            return Err(LifecycleError::invalid_config(
                "linear estimator needs max_iterations >= 1 and learning_rate > 0",
            ));
        }

        let mut weights = Array1::<f64>::zeros(d);
        let mut bias = 0.0;
        let n_f = n as f64;

        for _ in 0..self.max_iterations {
            ctx.checkpoint()?;

            let probabilities = (features.dot(&weights) + bias).mapv(sigmoid);
            let loss = log_loss(&probabilities, labels) + 0.5 * self.l2 * weights.dot(&weights);
            ctx.record_loss(loss)?;

            let error = &probabilities - labels;
            let grad_w = features.t().dot(&error) / n_f + &weights * self.l2;
            let grad_b = error.sum() / n_f;

            weights = weights - grad_w * self.learning_rate;
            bias -= grad_b * self.learning_rate;
        }

        Ok(FittedModel::Linear(LinearState {
            weights: weights.to_vec(),
            bias,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearState {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearState {
    pub fn predict_proba(&self, features: &Array2<f64>) -> LifecycleResult<Vec<f64>> {
        if features.ncols() != self.weights.len() {
            return Err(LifecycleError::invalid_config(format!(
                "linear model expects {} features, got {}",
                self.weights.len(),
                features.ncols()
            )));
        }
        let w = Array1::from(self.weights.clone());
        Ok((features.dot(&w) + self.bias).mapv(sigmoid).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::jobs::CancellationFlag;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let xs: Vec<f64> = (0..40).map(|i| (i as f64 - 19.5) / 10.0).collect();
        let x = Array2::from_shape_vec((40, 1), xs.clone()).unwrap();
        let y = Array1::from(xs.iter().map(|v| f64::from(u8::from(*v > 0.0))).collect::<Vec<_>>());
        (x, y)
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable();
        let flag = CancellationFlag::new();
        let mut ctx = FitContext::new(&flag);
        let model = LinearEstimator::default().fit(&x, &y, &mut ctx).unwrap();

        let trace = ctx.loss_trace();
        assert_eq!(trace.len(), 300);
        assert!(trace.last().unwrap() < &trace[0]);

        let predicted = model.predict(&x).unwrap();
        let correct = predicted
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| f64::from(**p) == **a)
            .count();
        assert!(correct >= 38);
    }

    #[test]
    fn test_hyperparameters_override_defaults() {
        let hp = Hyperparameters::new().with("max_iterations", 10).with("l2", 0.0);
        let est = LinearEstimator::from_hyperparameters(&hp);
        assert_eq!(est.max_iterations, 10);
        assert_eq!(est.l2, 0.0);
        assert_eq!(est.learning_rate, 0.1);
    }

    #[test]
    fn test_cancelled_before_first_iteration() {
        let (x, y) = separable();
        let flag = CancellationFlag::new();
        flag.cancel();
        let mut ctx = FitContext::new(&flag);
        let err = LinearEstimator::default().fit(&x, &y, &mut ctx).unwrap_err();
        assert!(matches!(err, LifecycleError::Cancelled { iterations: 0, .. }));
    }
}
