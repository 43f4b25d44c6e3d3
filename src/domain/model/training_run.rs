use super::hyperparameters::Hyperparameters;
use super::metrics::ClassificationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => anyhow::bail!("Invalid run status: {}", s),
        }
    }
}

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunPurpose {
    /// Train/validation/test holdout fit; candidate for promotion.
    Holdout,
    /// One window of a walk-forward validation.
    WalkForwardWindow { report_id: Uuid, index: usize },
}

/// Half-open row range `[start, end)` into a dataset, plus the bar
/// timestamps (ms) of its first and last rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

impl RowRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitBoundaries {
    pub train: RowRange,
    pub validation: RowRange,
    pub test: RowRange,
}

/// Inclusive bar time range (Unix ms) a model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRange {
    pub start: i64,
    pub end: i64,
}

impl DataRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub id: Uuid,
    pub model_id: Uuid,
    pub purpose: RunPurpose,
    pub status: RunStatus,
    pub hyperparameters: Hyperparameters,
    pub data_range: Option<DataRange>,
    pub splits: SplitBoundaries,
    pub loss_trace: Vec<f64>,
    pub train_metrics: Option<ClassificationMetrics>,
    pub validation_metrics: Option<ClassificationMetrics>,
    pub test_metrics: Option<ClassificationMetrics>,
    pub artifact_checksum: Option<String>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl TrainingRun {
    pub fn start(
        id: Uuid,
        model_id: Uuid,
        purpose: RunPurpose,
        hyperparameters: Hyperparameters,
        data_range: Option<DataRange>,
        splits: SplitBoundaries,
    ) -> Self {
        Self {
            id,
            model_id,
            purpose,
            status: RunStatus::Running,
            hyperparameters,
            data_range,
            splits,
            loss_trace: Vec::new(),
            train_metrics: None,
            validation_metrics: None,
            test_metrics: None,
            artifact_checksum: None,
            failure_reason: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }

    pub fn test_accuracy(&self) -> Option<f64> {
        self.test_metrics.map(|m| m.accuracy)
    }

    fn close(&mut self, status: RunStatus) {
        let now = Utc::now();
        self.status = status;
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.completed_at = Some(now);
    }

    pub fn complete(
        &mut self,
        loss_trace: Vec<f64>,
        train: ClassificationMetrics,
        validation: Option<ClassificationMetrics>,
        test: Option<ClassificationMetrics>,
        artifact_checksum: String,
    ) {
        self.loss_trace = loss_trace;
        self.train_metrics = Some(train);
        self.validation_metrics = validation;
        self.test_metrics = test;
        self.artifact_checksum = Some(artifact_checksum);
        self.close(RunStatus::Completed);
    }

    pub fn fail(&mut self, reason: String, partial_loss_trace: Vec<f64>) {
        self.failure_reason = Some(reason);
        self.loss_trace = partial_loss_trace;
        self.close(RunStatus::Failed);
    }

    pub fn cancel(&mut self, partial_loss_trace: Vec<f64>) {
        self.failure_reason = Some("cancelled".to_string());
        self.loss_trace = partial_loss_trace;
        self.close(RunStatus::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> TrainingRun {
        TrainingRun::start(
            Uuid::new_v4(),
            Uuid::new_v4(),
            RunPurpose::Holdout,
            Hyperparameters::new(),
            Some(DataRange::new(0, 1_000)),
            SplitBoundaries::default(),
        )
    }

    #[test]
    fn test_complete_sets_metrics_and_duration() {
        let mut r = run();
        assert!(!r.is_finished());
        let m = ClassificationMetrics {
            accuracy: 0.6,
            ..Default::default()
        };
        r.complete(vec![0.69, 0.6], m, None, Some(m), "abc".to_string());
        assert_eq!(r.status, RunStatus::Completed);
        assert_eq!(r.test_accuracy(), Some(0.6));
        assert!(r.duration_ms.is_some());
        assert!(r.is_finished());
    }

    #[test]
    fn test_cancel_keeps_partial_trace() {
        let mut r = run();
        r.cancel(vec![0.7, 0.68]);
        assert_eq!(r.status, RunStatus::Cancelled);
        assert_eq!(r.loss_trace.len(), 2);
        assert!(r.artifact_checksum.is_none());
    }

    #[test]
    fn test_purpose_serialization() {
        let p = RunPurpose::WalkForwardWindow {
            report_id: Uuid::nil(),
            index: 3,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("walk_forward_window"));
        let back: RunPurpose = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_row_range_len() {
        let r = RowRange {
            start: 10,
            end: 25,
            ..Default::default()
        };
        assert_eq!(r.len(), 15);
        assert!(RowRange::default().is_empty());
    }
}
