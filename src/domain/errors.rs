use thiserror::Error;
use uuid::Uuid;

use crate::domain::model::ModelStatus;

/// Errors surfaced by the model lifecycle engine.
///
/// Repositories speak `anyhow`; anything coming out of them is wrapped in
/// [`LifecycleError::Storage`] at the service boundary.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Insufficient data: need at least {required} rows, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Insufficient walk-forward windows for {rows} rows: {reason}")]
    InsufficientWindows { rows: usize, reason: String },

    #[error("Data quality check failed: {reason}")]
    DataQuality { reason: String },

    #[error("Training did not converge after {iterations} iterations: {reason}")]
    ConvergenceFailure {
        iterations: usize,
        reason: String,
        loss_trace: Vec<f64>,
    },

    #[error("Training cancelled after {iterations} iterations")]
    Cancelled {
        iterations: usize,
        loss_trace: Vec<f64>,
    },

    #[error("Model {model_id} already has a training job in flight")]
    Conflict { model_id: Uuid },

    #[error("Cannot promote run {run_id} of model {model_id}: {reason}")]
    InvalidPromotion {
        model_id: Uuid,
        run_id: Uuid,
        reason: String,
    },

    #[error("Model {model_id} is not ready for predictions (status {status})")]
    ModelNotReady { model_id: Uuid, status: ModelStatus },

    #[error("Invalid status transition for model {model_id}: {from} -> {to}")]
    InvalidTransition {
        model_id: Uuid,
        from: ModelStatus,
        to: ModelStatus,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Artifact {checksum} failed integrity check: {reason}")]
    ArtifactIntegrity { checksum: String, reason: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LifecycleError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn data_quality(reason: impl Into<String>) -> Self {
        Self::DataQuality {
            reason: reason.into(),
        }
    }

    /// Errors after which the model keeps the status it had before the job.
    pub fn preserves_prior_status(&self) -> bool {
        matches!(
            self,
            Self::ConvergenceFailure { .. }
                | Self::DataQuality { .. }
                | Self::InsufficientData { .. }
                | Self::InsufficientWindows { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Partial loss trace carried by fit failures, for run diagnostics.
    pub fn loss_trace(&self) -> &[f64] {
        match self {
            Self::ConvergenceFailure { loss_trace, .. } | Self::Cancelled { loss_trace, .. } => {
                loss_trace
            }
            _ => &[],
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_formatting() {
        let err = LifecycleError::InsufficientData {
            required: 20,
            available: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains("7"));
    }

    #[test]
    fn test_transition_formatting() {
        let err = LifecycleError::InvalidTransition {
            model_id: Uuid::nil(),
            from: ModelStatus::Archived,
            to: ModelStatus::Active,
        };
        let msg = err.to_string();
        assert!(msg.contains("archived -> active"));
    }

    #[test]
    fn test_prior_status_policy() {
        let convergence = LifecycleError::ConvergenceFailure {
            iterations: 3,
            reason: "nan loss".to_string(),
            loss_trace: vec![0.7, f64::NAN],
        };
        assert!(convergence.preserves_prior_status());
        assert_eq!(convergence.loss_trace().len(), 2);

        let cancelled = LifecycleError::Cancelled {
            iterations: 1,
            loss_trace: vec![0.69],
        };
        assert!(!cancelled.preserves_prior_status());
    }
}
