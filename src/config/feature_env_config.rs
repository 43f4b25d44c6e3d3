//! Feature and holdout-training configuration.

use super::parse_env;
use crate::application::dataset::SplitRatios;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureEnvConfig {
    /// Bars per feature window.
    pub lookback: usize,
    pub train_ratio: f64,
    pub validation_ratio: f64,
    pub test_ratio: f64,
    /// Permutation repeats per feature.
    pub importance_repeats: usize,
    /// Half-width of the probability band around 0.5 that maps to Hold.
    pub prediction_hold_band: f64,
}

impl Default for FeatureEnvConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            train_ratio: 0.6,
            validation_ratio: 0.2,
            test_ratio: 0.2,
            importance_repeats: 5,
            prediction_hold_band: 0.05,
        }
    }
}

impl FeatureEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            lookback: parse_env("FEATURE_LOOKBACK", d.lookback)?,
            train_ratio: parse_env("SPLIT_TRAIN_RATIO", d.train_ratio)?,
            validation_ratio: parse_env("SPLIT_VALIDATION_RATIO", d.validation_ratio)?,
            test_ratio: parse_env("SPLIT_TEST_RATIO", d.test_ratio)?,
            importance_repeats: parse_env("IMPORTANCE_REPEATS", d.importance_repeats)?,
            prediction_hold_band: parse_env("PREDICTION_HOLD_BAND", d.prediction_hold_band)?,
        })
    }

    pub fn split_ratios(&self) -> SplitRatios {
        SplitRatios::new(self.train_ratio, self.validation_ratio, self.test_ratio)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback == 0 {
            bail!("FEATURE_LOOKBACK must be at least 1");
        }
        if self.importance_repeats == 0 {
            bail!("IMPORTANCE_REPEATS must be at least 1");
        }
        if !(0.0..0.5).contains(&self.prediction_hold_band) {
            bail!(
                "PREDICTION_HOLD_BAND must be within [0, 0.5), got {}",
                self.prediction_hold_band
            );
        }
        self.split_ratios().validate()?;
        Ok(())
    }
}
