use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Realized live accuracy of a deployed model over a recent window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub id: Option<i64>,
    pub model_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
}

impl PerformanceSample {
    pub fn new(model_id: Uuid, accuracy: f64) -> Self {
        Self {
            id: None,
            model_id,
            timestamp: Utc::now(),
            accuracy,
        }
    }

    pub fn at(model_id: Uuid, timestamp: DateTime<Utc>, accuracy: f64) -> Self {
        Self {
            id: None,
            model_id,
            timestamp,
            accuracy,
        }
    }
}
