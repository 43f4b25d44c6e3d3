//! Drift monitoring configuration.

use super::{ensure_fraction, parse_env};
use crate::application::monitoring::DriftMonitorConfig;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftEnvConfig {
    pub window_size: usize,
    pub min_samples: usize,
    pub degradation_threshold: f64,
    pub recovery_samples: u32,
}

impl Default for DriftEnvConfig {
    fn default() -> Self {
        let d = DriftMonitorConfig::default();
        Self {
            window_size: d.window_size,
            min_samples: d.min_samples,
            degradation_threshold: d.degradation_threshold,
            recovery_samples: d.recovery_samples,
        }
    }
}

impl DriftEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            window_size: parse_env("DRIFT_WINDOW_SIZE", d.window_size)?,
            min_samples: parse_env("DRIFT_MIN_SAMPLES", d.min_samples)?,
            degradation_threshold: parse_env(
                "DRIFT_DEGRADATION_THRESHOLD",
                d.degradation_threshold,
            )?,
            recovery_samples: parse_env("DRIFT_RECOVERY_SAMPLES", d.recovery_samples)?,
        })
    }

    pub fn monitor_config(&self) -> DriftMonitorConfig {
        DriftMonitorConfig {
            window_size: self.window_size,
            min_samples: self.min_samples,
            degradation_threshold: self.degradation_threshold,
            recovery_samples: self.recovery_samples,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.min_samples == 0 {
            bail!("DRIFT_WINDOW_SIZE and DRIFT_MIN_SAMPLES must be at least 1");
        }
        if self.min_samples > self.window_size {
            bail!(
                "DRIFT_MIN_SAMPLES ({}) cannot exceed DRIFT_WINDOW_SIZE ({})",
                self.min_samples,
                self.window_size
            );
        }
        if self.recovery_samples == 0 {
            bail!("DRIFT_RECOVERY_SAMPLES must be at least 1");
        }
        ensure_fraction("DRIFT_DEGRADATION_THRESHOLD", self.degradation_threshold)
    }
}
