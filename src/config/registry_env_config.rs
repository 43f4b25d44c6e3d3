//! Promotion gates and live-sample retention.

use super::{ensure_fraction, parse_env};
use crate::application::registry::RegistryPolicy;
use crate::domain::model::Recommendation;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEnvConfig {
    pub min_test_accuracy: f64,
    pub min_promotion_tier: Recommendation,
    pub sample_retention_hours: i64,
}

impl Default for RegistryEnvConfig {
    fn default() -> Self {
        let d = RegistryPolicy::default();
        Self {
            min_test_accuracy: d.min_test_accuracy,
            min_promotion_tier: d.min_promotion_tier,
            sample_retention_hours: d.sample_retention_hours,
        }
    }
}

impl RegistryEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            min_test_accuracy: parse_env("PROMOTION_MIN_TEST_ACCURACY", d.min_test_accuracy)?,
            min_promotion_tier: parse_env("PROMOTION_MIN_TIER", d.min_promotion_tier)?,
            sample_retention_hours: parse_env("SAMPLE_RETENTION_HOURS", d.sample_retention_hours)?,
        })
    }

    pub fn policy(&self) -> RegistryPolicy {
        RegistryPolicy {
            min_test_accuracy: self.min_test_accuracy,
            min_promotion_tier: self.min_promotion_tier,
            sample_retention_hours: self.sample_retention_hours,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_retention_hours <= 0 {
            bail!("SAMPLE_RETENTION_HOURS must be positive");
        }
        ensure_fraction("PROMOTION_MIN_TEST_ACCURACY", self.min_test_accuracy)
    }
}
