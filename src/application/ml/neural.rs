use super::estimator::{FitContext, FittedModel, ModelEstimator, log_loss, sigmoid};
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, Hyperparameters};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One-hidden-layer perceptron: tanh hidden units, sigmoid output, full-batch
/// gradient descent from a seeded initialisation.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralEstimator {
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for NeuralEstimator {
    fn default() -> Self {
        Self {
            hidden_units: 16,
            epochs: 150,
            learning_rate: 0.05,
            seed: 42,
        }
    }
}

impl NeuralEstimator {
    pub fn from_hyperparameters(hp: &Hyperparameters) -> Self {
        let d = Self::default();
        Self {
            hidden_units: hp.get_usize("hidden_units", d.hidden_units),
            epochs: hp.get_usize("epochs", d.epochs),
            learning_rate: hp.get_f64("learning_rate", d.learning_rate),
            seed: hp.get_u64("seed", d.seed),
        }
    }
}

impl ModelEstimator for NeuralEstimator {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Neural
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
        if self.hidden_units == 0 || self.epochs == 0 || self.learning_rate <= 0.0 {
            return Err(LifecycleError::invalid_config(
                "neural estimator needs hidden_units >= 1, epochs >= 1 and learning_rate > 0",
            ));
        }

        let h = self.hidden_units;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let scale = 1.0 / (d.max(1) as f64).sqrt();
        let mut w1 = Array2::from_shape_fn((d, h), |_| rng.random_range(-scale..scale));
        let mut b1 = Array1::<f64>::zeros(h);
        let out_scale = 1.0 / (h as f64).sqrt();
        let mut w2 = Array1::from_shape_fn(h, |_| rng.random_range(-out_scale..out_scale));
        let mut b2 = 0.0;
        let n_f = n as f64;

        for _ in 0..self.epochs {
            ctx.checkpoint()?;

            let hidden = (features.dot(&w1) + &b1).mapv(f64::tanh);
            let probabilities = (hidden.dot(&w2) + b2).mapv(sigmoid);
            ctx.record_loss(log_loss(&probabilities, labels))?;

            let dz = (&probabilities - labels) / n_f;
            let grad_w2 = hidden.t().dot(&dz);
            let grad_b2 = dz.sum();

            let outer = dz
                .view()
                .insert_axis(Axis(1))
                .dot(&w2.view().insert_axis(Axis(0)));
            let d_hidden = outer * hidden.mapv(|a| 1.0 - a * a);
            let grad_w1 = features.t().dot(&d_hidden);
            let grad_b1 = d_hidden.sum_axis(Axis(0));

            w2 = w2 - grad_w2 * self.learning_rate;
            b2 -= grad_b2 * self.learning_rate;
            w1 = w1 - grad_w1 * self.learning_rate;
            b1 = b1 - grad_b1 * self.learning_rate;
        }

        Ok(FittedModel::Neural(NeuralState {
            input_dim: d,
            hidden_units: h,
            w1: w1.iter().copied().collect(),
            b1: b1.to_vec(),
            w2: w2.to_vec(),
            b2,
        }))
    }
}

/// Weights stored row-major; `w1` is `input_dim x hidden_units`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralState {
    pub input_dim: usize,
    pub hidden_units: usize,
    pub w1: Vec<f64>,
    pub b1: Vec<f64>,
    pub w2: Vec<f64>,
    pub b2: f64,
}

impl NeuralState {
    pub fn predict_proba(&self, features: &Array2<f64>) -> LifecycleResult<Vec<f64>> {
        if features.ncols() != self.input_dim {
            return Err(LifecycleError::invalid_config(format!(
                "neural model expects {} features, got {}",
                self.input_dim,
                features.ncols()
            )));
        }
        let w1 = Array2::from_shape_vec((self.input_dim, self.hidden_units), self.w1.clone())
            .map_err(|e| LifecycleError::invalid_config(format!("corrupt hidden weights: {}", e)))?;
        let b1 = Array1::from(self.b1.clone());
        let w2 = Array1::from(self.w2.clone());

        let hidden = (features.dot(&w1) + &b1).mapv(f64::tanh);
        Ok((hidden.dot(&w2) + self.b2).mapv(sigmoid).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::jobs::CancellationFlag;

    fn xor_like() -> (Array2<f64>, Array1<f64>) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..80 {
            let a = if i % 2 == 0 { 1.0 } else { -1.0 };
            let b = if (i / 2) % 2 == 0 { 1.0 } else { -1.0 };
            xs.extend([a, b]);
            ys.push(if a * b > 0.0 { 1.0 } else { 0.0 });
        }
        (Array2::from_shape_vec((80, 2), xs).unwrap(), Array1::from(ys))
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (x, y) = xor_like();
        let flag = CancellationFlag::new();
        let est = NeuralEstimator {
            epochs: 20,
            ..Default::default()
        };
        let a = est.fit(&x, &y, &mut FitContext::new(&flag)).unwrap();
        let b = est.fit(&x, &y, &mut FitContext::new(&flag)).unwrap();
        match (a, b) {
            (FittedModel::Neural(a), FittedModel::Neural(b)) => assert_eq!(a, b),
            _ => panic!("expected neural states"),
        }
    }

    #[test]
    fn test_loss_decreases() {
        let (x, y) = xor_like();
        let flag = CancellationFlag::new();
        let mut ctx = FitContext::new(&flag);
        let est = NeuralEstimator {
            epochs: 400,
            learning_rate: 0.5,
            ..Default::default()
        };
        est.fit(&x, &y, &mut ctx).unwrap();
        let trace = ctx.loss_trace();
        assert_eq!(trace.len(), 400);
        assert!(trace[399] < trace[0]);
    }

    #[test]
    fn test_state_rejects_wrong_width() {
        let state = NeuralState {
            input_dim: 3,
            hidden_units: 1,
            w1: vec![0.0; 3],
            b1: vec![0.0],
            w2: vec![1.0],
            b2: 0.0,
        };
        let x = Array2::zeros((1, 2));
        assert!(state.predict_proba(&x).is_err());
    }
}
