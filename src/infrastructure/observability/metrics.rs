//! Prometheus metrics definitions for the lifecycle engine
//!
//! All metrics use the `model_lifecycle_` prefix and are read-only.

use crate::domain::events::{EventListener, LifecycleEvent};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus metrics for training, validation and drift
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Training runs by outcome (completed, failed, cancelled)
    pub training_runs_total: CounterVec,
    /// Wall-clock duration of successful holdout trainings
    pub training_duration_seconds: HistogramVec,
    /// Walk-forward validations by recommendation tier
    pub validations_total: CounterVec,
    /// Drift transitions (detected, recovered)
    pub drift_events_total: CounterVec,
    /// Promotions and archivals
    pub registry_transitions_total: CounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with all counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let training_runs_total = CounterVec::new(
            Opts::new(
                "model_lifecycle_training_runs_total",
                "Total holdout training runs by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(training_runs_total.clone()))?;

        let training_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "model_lifecycle_training_duration_seconds",
                "Holdout training duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["model"],
        )?;
        registry.register(Box::new(training_duration_seconds.clone()))?;

        let validations_total = CounterVec::new(
            Opts::new(
                "model_lifecycle_validations_total",
                "Walk-forward validations by recommendation tier",
            ),
            &["recommendation"],
        )?;
        registry.register(Box::new(validations_total.clone()))?;

        let drift_events_total = CounterVec::new(
            Opts::new(
                "model_lifecycle_drift_events_total",
                "Drift state transitions by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(drift_events_total.clone()))?;

        let registry_transitions_total = CounterVec::new(
            Opts::new(
                "model_lifecycle_registry_transitions_total",
                "Model promotions and archivals",
            ),
            &["transition"],
        )?;
        registry.register(Box::new(registry_transitions_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            training_runs_total,
            training_duration_seconds,
            validations_total,
            drift_events_total,
            registry_transitions_total,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_training_runs(&self, outcome: &str) {
        self.training_runs_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_training_duration(&self, model: &str, seconds: f64) {
        self.training_duration_seconds
            .with_label_values(&[model])
            .observe(seconds);
    }

    pub fn record(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::TrainingStarted { .. } => {}
            LifecycleEvent::TrainingCompleted {
                model_id,
                duration_ms,
                ..
            } => {
                self.inc_training_runs("completed");
                self.observe_training_duration(&model_id.to_string(), *duration_ms as f64 / 1000.0);
            }
            LifecycleEvent::TrainingFailed { reason, .. } => {
                let outcome = if reason == "cancelled" { "cancelled" } else { "failed" };
                self.inc_training_runs(outcome);
            }
            LifecycleEvent::ValidationCompleted { recommendation, .. } => {
                self.validations_total
                    .with_label_values(&[recommendation.as_str()])
                    .inc();
            }
            LifecycleEvent::ModelPromoted { .. } => {
                self.registry_transitions_total
                    .with_label_values(&["promoted"])
                    .inc();
            }
            LifecycleEvent::ModelArchived { .. } => {
                self.registry_transitions_total
                    .with_label_values(&["archived"])
                    .inc();
            }
            LifecycleEvent::DriftDetected { .. } => {
                self.drift_events_total.with_label_values(&["detected"]).inc();
            }
            LifecycleEvent::DriftRecovered { .. } => {
                self.drift_events_total.with_label_values(&["recovered"]).inc();
            }
        }
    }
}

/// Event-bus listener that feeds [`Metrics`].
pub struct MetricsListener {
    metrics: Metrics,
}

impl MetricsListener {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

impl EventListener for MetricsListener {
    fn on_event(&self, event: &LifecycleEvent) {
        self.metrics.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Recommendation;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_training_runs("completed");
        assert!(metrics.gather_text().contains("model_lifecycle_"));
    }

    #[test]
    fn test_listener_counts_events() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let listener = MetricsListener::new(metrics.clone());
        let model_id = Uuid::new_v4();

        listener.on_event(&LifecycleEvent::TrainingCompleted {
            model_id,
            run_id: Uuid::new_v4(),
            test_accuracy: Some(0.61),
            duration_ms: 1_500,
        });
        listener.on_event(&LifecycleEvent::DriftDetected {
            model_id,
            baseline_accuracy: 0.65,
            rolling_accuracy: 0.60,
            degradation: 0.077,
            at: Utc::now(),
        });
        listener.on_event(&LifecycleEvent::ValidationCompleted {
            model_id,
            report_id: Uuid::new_v4(),
            mean_accuracy: 0.58,
            recommendation: Recommendation::Marginal,
        });

        assert_eq!(
            metrics
                .training_runs_total
                .with_label_values(&["completed"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics.drift_events_total.with_label_values(&["detected"]).get(),
            1.0
        );
        let output = metrics.gather_text();
        assert!(output.contains("model_lifecycle_training_duration_seconds"));
        assert!(output.contains("recommendation=\"marginal\""));
    }
}
