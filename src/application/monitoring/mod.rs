// Live accuracy tracking against the promotion baseline
pub mod drift_monitor;

pub use drift_monitor::{
    DriftAssessment, DriftMonitor, DriftMonitorConfig, DriftState, DriftTransition,
};
