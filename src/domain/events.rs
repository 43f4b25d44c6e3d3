use crate::domain::model::{ModelStatus, Recommendation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle notifications published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    TrainingStarted {
        model_id: Uuid,
        run_id: Uuid,
    },
    TrainingCompleted {
        model_id: Uuid,
        run_id: Uuid,
        test_accuracy: Option<f64>,
        duration_ms: u64,
    },
    TrainingFailed {
        model_id: Uuid,
        run_id: Option<Uuid>,
        reason: String,
        status: ModelStatus,
    },
    ValidationCompleted {
        model_id: Uuid,
        report_id: Uuid,
        mean_accuracy: f64,
        recommendation: Recommendation,
    },
    ModelPromoted {
        model_id: Uuid,
        run_id: Uuid,
        artifact: String,
    },
    ModelArchived {
        model_id: Uuid,
    },
    DriftDetected {
        model_id: Uuid,
        baseline_accuracy: f64,
        rolling_accuracy: f64,
        degradation: f64,
        at: DateTime<Utc>,
    },
    DriftRecovered {
        model_id: Uuid,
        rolling_accuracy: f64,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn model_id(&self) -> Uuid {
        match self {
            LifecycleEvent::TrainingStarted { model_id, .. }
            | LifecycleEvent::TrainingCompleted { model_id, .. }
            | LifecycleEvent::TrainingFailed { model_id, .. }
            | LifecycleEvent::ValidationCompleted { model_id, .. }
            | LifecycleEvent::ModelPromoted { model_id, .. }
            | LifecycleEvent::ModelArchived { model_id }
            | LifecycleEvent::DriftDetected { model_id, .. }
            | LifecycleEvent::DriftRecovered { model_id, .. } => *model_id,
        }
    }
}

/// Receiver of lifecycle events (notification systems, metrics, tests).
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Writes every event to the log.
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::DriftDetected {
                model_id,
                baseline_accuracy,
                rolling_accuracy,
                degradation,
                ..
            } => warn!(
                "Drift ALERT [{}]: rolling accuracy {:.3} vs baseline {:.3} ({:.1}% degradation)",
                model_id,
                rolling_accuracy,
                baseline_accuracy,
                degradation * 100.0
            ),
            LifecycleEvent::TrainingFailed {
                model_id, reason, ..
            } => warn!("Training failed [{}]: {}", model_id, reason),
            other => info!("Lifecycle event: {:?}", other),
        }
    }
}
