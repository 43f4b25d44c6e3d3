use crate::domain::events::LifecycleEvent;
use crate::domain::model::{Model, PerformanceSample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftMonitorConfig {
    /// Samples in the rolling accuracy window.
    pub window_size: usize,
    /// Samples required before the first evaluation.
    pub min_samples: usize,
    /// Relative drop below baseline that counts as degraded.
    pub degradation_threshold: f64,
    /// Consecutive healthy evaluations needed to clear an alert.
    pub recovery_samples: u32,
}

impl Default for DriftMonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_samples: 5,
            degradation_threshold: 0.05,
            recovery_samples: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftState {
    Stable,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftTransition {
    Detected,
    Recovered,
}

/// Outcome of evaluating one incoming sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAssessment {
    pub model_id: Uuid,
    pub state: DriftState,
    /// False when there is no baseline or too few samples yet.
    pub evaluated: bool,
    pub samples_considered: usize,
    pub baseline_accuracy: Option<f64>,
    pub rolling_accuracy: Option<f64>,
    pub degradation: Option<f64>,
    pub recovery_streak: u32,
    pub transition: Option<DriftTransition>,
    pub at: DateTime<Utc>,
}

/// Per-model `Stable <-> Degraded` state machine over live accuracy.
///
/// Alerts are reported only; nothing here retrains or demotes a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftMonitor {
    config: DriftMonitorConfig,
}

impl DriftMonitor {
    pub fn new(config: DriftMonitorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriftMonitorConfig {
        &self.config
    }

    /// Pure evaluation of `recent` (chronological, newest last) against the
    /// model's baseline and current drift flags.
    pub fn evaluate(
        &self,
        model: &Model,
        recent: &[PerformanceSample],
        at: DateTime<Utc>,
    ) -> DriftAssessment {
        let before = if model.drift_detected {
            DriftState::Degraded
        } else {
            DriftState::Stable
        };
        let window = &recent[recent.len().saturating_sub(self.config.window_size)..];

        let mut assessment = DriftAssessment {
            model_id: model.id,
            state: before,
            evaluated: false,
            samples_considered: window.len(),
            baseline_accuracy: model.baseline_accuracy,
            rolling_accuracy: None,
            degradation: None,
            recovery_streak: model.drift_recovery_streak,
            transition: None,
            at,
        };

        let Some(baseline) = model.baseline_accuracy.filter(|b| *b > 0.0) else {
            return assessment;
        };
        if window.is_empty() || window.len() < self.config.min_samples {
            return assessment;
        }

        let rolling = window.iter().map(|s| s.accuracy).sum::<f64>() / window.len() as f64;
        let degradation = (baseline - rolling) / baseline;
        let degraded = degradation > self.config.degradation_threshold;

        assessment.evaluated = true;
        assessment.rolling_accuracy = Some(rolling);
        assessment.degradation = Some(degradation);

        match (before, degraded) {
            (DriftState::Stable, true) => {
                assessment.state = DriftState::Degraded;
                assessment.transition = Some(DriftTransition::Detected);
                assessment.recovery_streak = 0;
            }
            (DriftState::Stable, false) => {
                assessment.recovery_streak = 0;
            }
            (DriftState::Degraded, true) => {
                assessment.recovery_streak = 0;
            }
            (DriftState::Degraded, false) => {
                let streak = model.drift_recovery_streak + 1;
                if streak >= self.config.recovery_samples {
                    assessment.state = DriftState::Stable;
                    assessment.transition = Some(DriftTransition::Recovered);
                    assessment.recovery_streak = 0;
                } else {
                    assessment.recovery_streak = streak;
                }
            }
        }
        assessment
    }

    /// Writes the assessment's drift flags onto the model. Returns true when
    /// anything changed.
    pub fn apply(model: &mut Model, assessment: &DriftAssessment) -> bool {
        let before = (
            model.drift_detected,
            model.drift_detected_at,
            model.drift_recovery_streak,
        );

        model.drift_recovery_streak = assessment.recovery_streak;
        match assessment.transition {
            Some(DriftTransition::Detected) => {
                model.drift_detected = true;
                model.drift_detected_at = Some(assessment.at);
            }
            Some(DriftTransition::Recovered) => {
                model.drift_detected = false;
                model.drift_detected_at = None;
            }
            None => {}
        }

        let changed = before
            != (
                model.drift_detected,
                model.drift_detected_at,
                model.drift_recovery_streak,
            );
        if changed {
            model.updated_at = assessment.at;
        }
        changed
    }

    pub fn event_for(assessment: &DriftAssessment) -> Option<LifecycleEvent> {
        match assessment.transition? {
            DriftTransition::Detected => Some(LifecycleEvent::DriftDetected {
                model_id: assessment.model_id,
                baseline_accuracy: assessment.baseline_accuracy.unwrap_or_default(),
                rolling_accuracy: assessment.rolling_accuracy.unwrap_or_default(),
                degradation: assessment.degradation.unwrap_or_default(),
                at: assessment.at,
            }),
            DriftTransition::Recovered => Some(LifecycleEvent::DriftRecovered {
                model_id: assessment.model_id,
                rolling_accuracy: assessment.rolling_accuracy.unwrap_or_default(),
                at: assessment.at,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use crate::domain::model::{AlgorithmKind, Hyperparameters, NewModel};

    fn model(baseline: Option<f64>) -> Model {
        let mut m = Model::new(NewModel {
            name: "drift".to_string(),
            symbols: vec!["BTC/USDT".to_string()],
            timeframe: Timeframe::OneHour,
            algorithm: AlgorithmKind::Linear,
            hyperparameters: Hyperparameters::new(),
        });
        m.baseline_accuracy = baseline;
        m
    }

    fn samples(model: &Model, accuracy: f64, n: usize) -> Vec<PerformanceSample> {
        (0..n).map(|_| PerformanceSample::new(model.id, accuracy)).collect()
    }

    #[test]
    fn test_rolling_drop_beyond_threshold_is_degraded() {
        let m = model(Some(0.65));
        let a = DriftMonitor::default().evaluate(&m, &samples(&m, 0.60, 20), Utc::now());
        assert!(a.evaluated);
        assert_eq!(a.state, DriftState::Degraded);
        assert_eq!(a.transition, Some(DriftTransition::Detected));
        assert!((a.degradation.unwrap() - 0.05 / 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_small_drop_stays_stable() {
        let m = model(Some(0.65));
        let a = DriftMonitor::default().evaluate(&m, &samples(&m, 0.64, 20), Utc::now());
        assert_eq!(a.state, DriftState::Stable);
        assert_eq!(a.transition, None);
    }

    #[test]
    fn test_needs_baseline_and_min_samples() {
        let no_baseline = model(None);
        let a = DriftMonitor::default().evaluate(&no_baseline, &samples(&no_baseline, 0.1, 20), Utc::now());
        assert!(!a.evaluated);

        let m = model(Some(0.65));
        let a = DriftMonitor::default().evaluate(&m, &samples(&m, 0.1, 4), Utc::now());
        assert!(!a.evaluated);
        assert_eq!(a.state, DriftState::Stable);
    }

    #[test]
    fn test_only_last_window_counts() {
        let m = model(Some(0.65));
        let mut history = samples(&m, 0.10, 30);
        history.extend(samples(&m, 0.66, 20));
        let a = DriftMonitor::default().evaluate(&m, &history, Utc::now());
        assert_eq!(a.samples_considered, 20);
        assert_eq!(a.state, DriftState::Stable);
    }

    #[test]
    fn test_recovery_after_consecutive_healthy_samples() {
        let monitor = DriftMonitor::default();
        let mut m = model(Some(0.65));
        let degraded = monitor.evaluate(&m, &samples(&m, 0.5, 10), Utc::now());
        assert!(DriftMonitor::apply(&mut m, &degraded));
        assert!(m.drift_detected);
        assert!(m.drift_detected_at.is_some());

        let healthy = samples(&m, 0.65, 10);
        for expected_streak in [1, 2] {
            let a = monitor.evaluate(&m, &healthy, Utc::now());
            assert_eq!(a.state, DriftState::Degraded);
            assert_eq!(a.recovery_streak, expected_streak);
            DriftMonitor::apply(&mut m, &a);
        }

        let a = monitor.evaluate(&m, &healthy, Utc::now());
        assert_eq!(a.transition, Some(DriftTransition::Recovered));
        assert!(matches!(
            DriftMonitor::event_for(&a),
            Some(LifecycleEvent::DriftRecovered { .. })
        ));
        DriftMonitor::apply(&mut m, &a);
        assert!(!m.drift_detected);
        assert_eq!(m.drift_recovery_streak, 0);
    }

    #[test]
    fn test_relapse_resets_streak() {
        let monitor = DriftMonitor::default();
        let mut m = model(Some(0.65));
        m.drift_detected = true;
        m.drift_recovery_streak = 2;
        let a = monitor.evaluate(&m, &samples(&m, 0.40, 10), Utc::now());
        assert_eq!(a.recovery_streak, 0);
        assert_eq!(a.transition, None);
        assert_eq!(a.state, DriftState::Degraded);
    }
}
