//! Push-based observability for the lifecycle engine
//!
//! No HTTP server: metrics are rendered to Prometheus text on demand
//! (`Metrics::gather_text`) and fed by `MetricsListener` from the event bus.

pub mod metrics;

pub use metrics::{Metrics, MetricsListener};
