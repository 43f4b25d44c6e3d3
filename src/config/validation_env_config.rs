//! Walk-forward validation configuration: window layout, execution mode and
//! recommendation tiers.

use super::{ensure_fraction, parse_env};
use crate::domain::model::{RecommendationPolicy, WindowConfig, WindowType};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationEnvConfig {
    pub window_type: WindowType,
    pub initial_train_fraction: f64,
    pub test_fraction: f64,
    pub step_fraction: f64,
    /// Train windows on the rayon pool instead of one after another.
    pub parallel: bool,
    pub good_min_accuracy: f64,
    pub good_min_consistency: f64,
    pub acceptable_min_accuracy: f64,
    pub acceptable_min_consistency: f64,
    pub marginal_min_accuracy: f64,
}

impl Default for ValidationEnvConfig {
    fn default() -> Self {
        let window = WindowConfig::default();
        let policy = RecommendationPolicy::default();
        Self {
            window_type: window.window_type,
            initial_train_fraction: window.initial_train_fraction,
            test_fraction: window.test_fraction,
            step_fraction: window.step_fraction,
            parallel: false,
            good_min_accuracy: policy.good_min_accuracy,
            good_min_consistency: policy.good_min_consistency,
            acceptable_min_accuracy: policy.acceptable_min_accuracy,
            acceptable_min_consistency: policy.acceptable_min_consistency,
            marginal_min_accuracy: policy.marginal_min_accuracy,
        }
    }
}

impl ValidationEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            window_type: parse_env("WF_WINDOW_TYPE", d.window_type)?,
            initial_train_fraction: parse_env("WF_INITIAL_TRAIN_FRACTION", d.initial_train_fraction)?,
            test_fraction: parse_env("WF_TEST_FRACTION", d.test_fraction)?,
            step_fraction: parse_env("WF_STEP_FRACTION", d.step_fraction)?,
            parallel: parse_env("WF_PARALLEL", d.parallel)?,
            good_min_accuracy: parse_env("TIER_GOOD_MIN_ACCURACY", d.good_min_accuracy)?,
            good_min_consistency: parse_env("TIER_GOOD_MIN_CONSISTENCY", d.good_min_consistency)?,
            acceptable_min_accuracy: parse_env(
                "TIER_ACCEPTABLE_MIN_ACCURACY",
                d.acceptable_min_accuracy,
            )?,
            acceptable_min_consistency: parse_env(
                "TIER_ACCEPTABLE_MIN_CONSISTENCY",
                d.acceptable_min_consistency,
            )?,
            marginal_min_accuracy: parse_env("TIER_MARGINAL_MIN_ACCURACY", d.marginal_min_accuracy)?,
        })
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            initial_train_fraction: self.initial_train_fraction,
            test_fraction: self.test_fraction,
            step_fraction: self.step_fraction,
            window_type: self.window_type,
        }
    }

    pub fn recommendation_policy(&self) -> RecommendationPolicy {
        RecommendationPolicy {
            good_min_accuracy: self.good_min_accuracy,
            good_min_consistency: self.good_min_consistency,
            acceptable_min_accuracy: self.acceptable_min_accuracy,
            acceptable_min_consistency: self.acceptable_min_consistency,
            marginal_min_accuracy: self.marginal_min_accuracy,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("WF_INITIAL_TRAIN_FRACTION", self.initial_train_fraction),
            ("WF_TEST_FRACTION", self.test_fraction),
            ("WF_STEP_FRACTION", self.step_fraction),
            ("TIER_GOOD_MIN_ACCURACY", self.good_min_accuracy),
            ("TIER_GOOD_MIN_CONSISTENCY", self.good_min_consistency),
            ("TIER_ACCEPTABLE_MIN_ACCURACY", self.acceptable_min_accuracy),
            ("TIER_ACCEPTABLE_MIN_CONSISTENCY", self.acceptable_min_consistency),
            ("TIER_MARGINAL_MIN_ACCURACY", self.marginal_min_accuracy),
        ] {
            ensure_fraction(name, value)?;
        }
        if self.step_fraction < self.test_fraction {
            bail!(
                "WF_STEP_FRACTION ({}) must be at least WF_TEST_FRACTION ({}) so test windows never overlap",
                self.step_fraction,
                self.test_fraction
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_domain_defaults() {
        let config = ValidationEnvConfig::default();
        assert_eq!(config.window_config(), WindowConfig::default());
        assert_eq!(config.recommendation_policy(), RecommendationPolicy::default());
        assert!(!config.parallel);
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let config = ValidationEnvConfig {
            step_fraction: 0.05,
            test_fraction: 0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
