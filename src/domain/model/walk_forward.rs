use super::training_run::RowRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    /// Train start fixed at 0, train end grows each step.
    Expanding,
    /// Train length constant, start and end both advance.
    Rolling,
}

impl FromStr for WindowType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expanding" => Ok(WindowType::Expanding),
            "rolling" => Ok(WindowType::Rolling),
            _ => anyhow::bail!("Invalid window type: {}. Must be 'expanding' or 'rolling'", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub initial_train_fraction: f64,
    pub test_fraction: f64,
    pub step_fraction: f64,
    pub window_type: WindowType,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial_train_fraction: 0.5,
            test_fraction: 0.1,
            step_fraction: 0.1,
            window_type: WindowType::Expanding,
        }
    }
}

/// Production-readiness verdict, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Poor,
    Marginal,
    Acceptable,
    Good,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Poor => "poor",
            Recommendation::Marginal => "marginal",
            Recommendation::Acceptable => "acceptable",
            Recommendation::Good => "good",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Recommendation::Good => "production-ready",
            Recommendation::Acceptable => "needs tuning",
            Recommendation::Marginal => "significant improvement needed",
            Recommendation::Poor => "not recommended",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "poor" => Ok(Recommendation::Poor),
            "marginal" => Ok(Recommendation::Marginal),
            "acceptable" => Ok(Recommendation::Acceptable),
            "good" => Ok(Recommendation::Good),
            _ => anyhow::bail!("Invalid recommendation tier: {}", s),
        }
    }
}

/// Two-dimensional accuracy x consistency tiering.
///
/// Comparisons are strict (`>`). The three upper tiers are checked in order;
/// anything at or below `marginal_min_accuracy` is Poor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendationPolicy {
    pub good_min_accuracy: f64,
    pub good_min_consistency: f64,
    pub acceptable_min_accuracy: f64,
    pub acceptable_min_consistency: f64,
    pub marginal_min_accuracy: f64,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            good_min_accuracy: 0.60,
            good_min_consistency: 0.80,
            acceptable_min_accuracy: 0.55,
            acceptable_min_consistency: 0.70,
            marginal_min_accuracy: 0.50,
        }
    }
}

impl RecommendationPolicy {
    pub fn classify(&self, mean_accuracy: f64, consistency: f64) -> Recommendation {
        if mean_accuracy > self.good_min_accuracy && consistency > self.good_min_consistency {
            Recommendation::Good
        } else if mean_accuracy > self.acceptable_min_accuracy
            && consistency > self.acceptable_min_consistency
        {
            Recommendation::Acceptable
        } else if mean_accuracy > self.marginal_min_accuracy {
            Recommendation::Marginal
        } else {
            Recommendation::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub index: usize,
    pub train_range: RowRange,
    pub test_range: RowRange,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub training_run_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardAggregate {
    pub mean_accuracy: f64,
    pub std_accuracy: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
    /// `1 - std/mean`, floored at 0.
    pub consistency: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub id: Uuid,
    pub model_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub config: WindowConfig,
    pub windows: Vec<WindowResult>,
    pub aggregate: WalkForwardAggregate,
}

impl WalkForwardReport {
    pub fn recommendation(&self) -> Recommendation {
        self.aggregate.recommendation
    }

    pub fn passes(&self, minimum: Recommendation) -> bool {
        self.aggregate.recommendation >= minimum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_tiers() {
        let policy = RecommendationPolicy::default();
        assert_eq!(policy.classify(0.62, 0.85), Recommendation::Good);
        // high accuracy but unstable drops a tier
        assert_eq!(policy.classify(0.62, 0.75), Recommendation::Acceptable);
        assert_eq!(policy.classify(0.56, 0.95), Recommendation::Acceptable);
        assert_eq!(policy.classify(0.56, 0.50), Recommendation::Marginal);
        assert_eq!(policy.classify(0.51, 0.99), Recommendation::Marginal);
        assert_eq!(policy.classify(0.50, 0.99), Recommendation::Poor);
        assert_eq!(policy.classify(0.30, 0.10), Recommendation::Poor);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let policy = RecommendationPolicy::default();
        assert_eq!(policy.classify(0.60, 0.90), Recommendation::Acceptable);
        assert_eq!(policy.classify(0.65, 0.80), Recommendation::Acceptable);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Recommendation::Good > Recommendation::Acceptable);
        assert!(Recommendation::Acceptable > Recommendation::Marginal);
        assert!(Recommendation::Marginal > Recommendation::Poor);
    }
}
