use super::linear::{LinearEstimator, LinearState};
use super::neural::{NeuralEstimator, NeuralState};
use super::tree_ensemble::{TreeEnsembleEstimator, TreeEnsembleState};
use crate::application::jobs::CancellationFlag;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::model::{AlgorithmKind, Hyperparameters};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A loss this many times the first recorded one counts as divergence.
const DIVERGENCE_FACTOR: f64 = 1e3;

/// Per-fit bookkeeping: cancellation checkpoints and the loss trace.
pub struct FitContext<'a> {
    cancel: &'a CancellationFlag,
    loss_trace: Vec<f64>,
}

impl<'a> FitContext<'a> {
    pub fn new(cancel: &'a CancellationFlag) -> Self {
        Self {
            cancel,
            loss_trace: Vec::new(),
        }
    }

    /// Call between iterations; fails with `Cancelled` once the flag is set.
    pub fn checkpoint(&self) -> LifecycleResult<()> {
        if self.cancel.is_cancelled() {
            return Err(LifecycleError::Cancelled {
                iterations: self.loss_trace.len(),
                loss_trace: self.loss_trace.clone(),
            });
        }
        Ok(())
    }

    /// Appends `loss`; non-finite or exploding losses abort the fit.
    pub fn record_loss(&mut self, loss: f64) -> LifecycleResult<()> {
        self.loss_trace.push(loss);
        let first = self.loss_trace[0];
        let diverged = first.is_finite() && first > 0.0 && loss > first * DIVERGENCE_FACTOR;
        if !loss.is_finite() || diverged {
            return Err(LifecycleError::ConvergenceFailure {
                iterations: self.loss_trace.len(),
                reason: if diverged {
                    format!("loss diverged to {:.4e} from {:.4e}", loss, first)
                } else {
                    format!("non-finite loss {}", loss)
                },
                loss_trace: self.loss_trace.clone(),
            });
        }
        Ok(())
    }

    pub fn loss_trace(&self) -> &[f64] {
        &self.loss_trace
    }

    pub fn into_loss_trace(self) -> Vec<f64> {
        self.loss_trace
    }
}

/// Pluggable learning algorithm. Inputs are already scaled; labels are 0/1.
pub trait ModelEstimator: Send + Sync {
    fn kind(&self) -> AlgorithmKind;

    fn fit(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        ctx: &mut FitContext<'_>,
    ) -> LifecycleResult<FittedModel>;
}

/// Fitted state of any estimator, serialisable into an artifact.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(LinearState),
    TreeEnsemble(TreeEnsembleState),
    Neural(NeuralState),
}

impl FittedModel {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            FittedModel::Linear(_) => AlgorithmKind::Linear,
            FittedModel::TreeEnsemble(_) => AlgorithmKind::TreeEnsemble,
            FittedModel::Neural(_) => AlgorithmKind::Neural,
        }
    }

    /// Probability that the next bar closes up, one per row.
    pub fn predict_proba(&self, features: &Array2<f64>) -> LifecycleResult<Vec<f64>> {
        match self {
            FittedModel::Linear(state) => state.predict_proba(features),
            FittedModel::TreeEnsemble(state) => state.predict_proba(features),
            FittedModel::Neural(state) => state.predict_proba(features),
        }
    }

    pub fn predict(&self, features: &Array2<f64>) -> LifecycleResult<Vec<u8>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| u8::from(p >= 0.5))
            .collect())
    }
}

pub fn estimator_for(kind: AlgorithmKind, hp: &Hyperparameters) -> Box<dyn ModelEstimator> {
    match kind {
        AlgorithmKind::Linear => Box::new(LinearEstimator::from_hyperparameters(hp)),
        AlgorithmKind::TreeEnsemble => Box::new(TreeEnsembleEstimator::from_hyperparameters(hp)),
        AlgorithmKind::Neural => Box::new(NeuralEstimator::from_hyperparameters(hp)),
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Mean binary cross-entropy with probabilities clipped away from 0 and 1.
pub(crate) fn log_loss(probabilities: &Array1<f64>, labels: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-12;
    let n = labels.len().max(1) as f64;
    probabilities
        .iter()
        .zip(labels.iter())
        .map(|(p, y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_reports_partial_trace() {
        let flag = CancellationFlag::new();
        let mut ctx = FitContext::new(&flag);
        ctx.record_loss(0.69).unwrap();
        ctx.record_loss(0.61).unwrap();
        flag.cancel();
        match ctx.checkpoint() {
            Err(LifecycleError::Cancelled {
                iterations,
                loss_trace,
            }) => {
                assert_eq!(iterations, 2);
                assert_eq!(loss_trace, vec![0.69, 0.61]);
            }
            other => panic!("expected Cancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_loss_fails() {
        let flag = CancellationFlag::new();
        let mut ctx = FitContext::new(&flag);
        ctx.record_loss(0.7).unwrap();
        let err = ctx.record_loss(f64::NAN).unwrap_err();
        assert!(matches!(err, LifecycleError::ConvergenceFailure { iterations: 2, .. }));
    }

    #[test]
    fn test_exploding_loss_fails() {
        let flag = CancellationFlag::new();
        let mut ctx = FitContext::new(&flag);
        ctx.record_loss(0.5).unwrap();
        assert!(ctx.record_loss(1e4).is_err());
    }

    #[test]
    fn test_log_loss_of_perfect_guess_is_small() {
        let p = Array1::from(vec![0.999, 0.001]);
        let y = Array1::from(vec![1.0, 0.0]);
        assert!(log_loss(&p, &y) < 0.01);
    }
}
