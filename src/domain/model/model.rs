use super::hyperparameters::Hyperparameters;
use crate::domain::market::Timeframe;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a model.
///
/// `draft → training → validated → active → archived`, with `failed`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Draft,
    Training,
    Validated,
    Active,
    Archived,
    Failed,
}

impl ModelStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelStatus::Archived | ModelStatus::Failed)
    }

    /// Forward transitions plus `* -> failed` for non-terminal states.
    pub fn can_transition_to(&self, next: ModelStatus) -> bool {
        use ModelStatus::*;
        match (*self, next) {
            (Draft, Training)
            | (Validated, Training)
            | (Training, Validated)
            | (Validated, Active)
            | (Active, Active)
            | (Active, Archived) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// A job that did not produce a result hands the model back its
    /// pre-job status.
    pub fn can_roll_back_to(&self, prior: ModelStatus) -> bool {
        *self == ModelStatus::Training
            && matches!(prior, ModelStatus::Draft | ModelStatus::Validated)
    }

    /// Statuses from which a training or validation job may start.
    pub fn trainable() -> &'static [ModelStatus] {
        &[ModelStatus::Draft, ModelStatus::Validated]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Draft => "draft",
            ModelStatus::Training => "training",
            ModelStatus::Validated => "validated",
            ModelStatus::Active => "active",
            ModelStatus::Archived => "archived",
            ModelStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ModelStatus::Draft),
            "training" => Ok(ModelStatus::Training),
            "validated" => Ok(ModelStatus::Validated),
            "active" => Ok(ModelStatus::Active),
            "archived" => Ok(ModelStatus::Archived),
            "failed" => Ok(ModelStatus::Failed),
            _ => Err(anyhow!("Invalid model status: {}", s)),
        }
    }
}

/// Which fit/predict capability backs a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Linear,
    TreeEnsemble,
    Neural,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Linear => "linear",
            AlgorithmKind::TreeEnsemble => "tree_ensemble",
            AlgorithmKind::Neural => "neural",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" | "logistic" => Ok(AlgorithmKind::Linear),
            "tree_ensemble" | "random_forest" | "forest" => Ok(AlgorithmKind::TreeEnsemble),
            "neural" | "mlp" => Ok(AlgorithmKind::Neural),
            _ => Err(anyhow!(
                "Invalid algorithm: {}. Must be 'linear', 'tree_ensemble' or 'neural'",
                s
            )),
        }
    }
}

/// Request to register a new model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewModel {
    pub name: String,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub algorithm: AlgorithmKind,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

/// Overrides applied when deriving a child model from a parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildModelSpec {
    pub name: Option<String>,
    pub algorithm: Option<AlgorithmKind>,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: Uuid,
    pub name: String,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub algorithm: AlgorithmKind,
    pub status: ModelStatus,
    pub hyperparameters: Hyperparameters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Weak back-reference for lineage queries; never owns the parent.
    pub parent_id: Option<Uuid>,
    pub baseline_accuracy: Option<f64>,
    pub drift_detected: bool,
    pub drift_detected_at: Option<DateTime<Utc>>,
    /// Consecutive in-tolerance samples seen while degraded.
    pub drift_recovery_streak: u32,
    pub active_run_id: Option<Uuid>,
    pub active_artifact: Option<String>,
}

impl Model {
    pub fn new(spec: NewModel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: spec.name,
            symbols: spec.symbols,
            timeframe: spec.timeframe,
            algorithm: spec.algorithm,
            status: ModelStatus::Draft,
            hyperparameters: spec.hyperparameters,
            created_at: now,
            updated_at: now,
            parent_id: None,
            baseline_accuracy: None,
            drift_detected: false,
            drift_detected_at: None,
            drift_recovery_streak: 0,
            active_run_id: None,
            active_artifact: None,
        }
    }

    /// Derive a retraining successor. Lineage and configuration are
    /// inherited, runtime state (status, artifact, drift) is not.
    pub fn child_of(parent: &Model, spec: ChildModelSpec) -> Self {
        let mut child = Model::new(NewModel {
            name: spec
                .name
                .unwrap_or_else(|| format!("{}-retrain", parent.name)),
            symbols: parent.symbols.clone(),
            timeframe: parent.timeframe,
            algorithm: spec.algorithm.unwrap_or(parent.algorithm),
            hyperparameters: parent.hyperparameters.merged(&spec.hyperparameters),
        });
        child.parent_id = Some(parent.id);
        child
    }

    pub fn primary_symbol(&self) -> &str {
        self.symbols.first().map(String::as_str).unwrap_or("")
    }
}

/// Criteria for `list_models`; unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelFilter {
    pub status: Option<ModelStatus>,
    pub symbol: Option<String>,
    pub algorithm: Option<AlgorithmKind>,
    pub drift_detected: Option<bool>,
    pub parent_id: Option<Uuid>,
}

impl ModelFilter {
    pub fn matches(&self, model: &Model) -> bool {
        self.status.is_none_or(|s| model.status == s)
            && self
                .symbol
                .as_ref()
                .is_none_or(|s| model.symbols.iter().any(|m| m == s))
            && self.algorithm.is_none_or(|a| model.algorithm == a)
            && self.drift_detected.is_none_or(|d| model.drift_detected == d)
            && self.parent_id.is_none_or(|p| model.parent_id == Some(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> NewModel {
        NewModel {
            name: "btc-direction".to_string(),
            symbols: vec!["BTC/USDT".to_string()],
            timeframe: Timeframe::OneHour,
            algorithm: AlgorithmKind::Linear,
            hyperparameters: Hyperparameters::new().with("learning_rate", 0.1),
        }
    }

    #[test]
    fn test_new_model_starts_in_draft() {
        let model = Model::new(spec());
        assert_eq!(model.status, ModelStatus::Draft);
        assert!(model.parent_id.is_none());
        assert!(!model.drift_detected);
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ModelStatus::*;
        assert!(Draft.can_transition_to(Training));
        assert!(Training.can_transition_to(Validated));
        assert!(Validated.can_transition_to(Active));
        assert!(Active.can_transition_to(Archived));
        assert!(Training.can_transition_to(Failed));
        assert!(Active.can_transition_to(Failed));

        assert!(!Active.can_transition_to(Training));
        assert!(!Validated.can_transition_to(Draft));
        assert!(!Archived.can_transition_to(Active));
        assert!(!Archived.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Active));
    }

    #[test]
    fn test_roll_back_only_from_training() {
        use ModelStatus::*;
        assert!(Training.can_roll_back_to(Draft));
        assert!(Training.can_roll_back_to(Validated));
        assert!(!Training.can_roll_back_to(Active));
        assert!(!Validated.can_roll_back_to(Draft));
    }

    #[test]
    fn test_child_inherits_and_overrides() {
        let parent = Model::new(spec());
        let child = Model::child_of(
            &parent,
            ChildModelSpec {
                name: None,
                algorithm: Some(AlgorithmKind::Neural),
                hyperparameters: Hyperparameters::new().with("epochs", 10),
            },
        );
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.name, "btc-direction-retrain");
        assert_eq!(child.algorithm, AlgorithmKind::Neural);
        assert_eq!(child.hyperparameters.get_f64("learning_rate", 0.0), 0.1);
        assert_eq!(child.hyperparameters.get_usize("epochs", 0), 10);
        assert_eq!(child.status, ModelStatus::Draft);
    }

    #[test]
    fn test_filter() {
        let mut model = Model::new(spec());
        model.status = ModelStatus::Active;

        let by_symbol = ModelFilter {
            symbol: Some("BTC/USDT".to_string()),
            ..Default::default()
        };
        assert!(by_symbol.matches(&model));

        let by_status = ModelFilter {
            status: Some(ModelStatus::Draft),
            ..Default::default()
        };
        assert!(!by_status.matches(&model));
        assert!(ModelFilter::default().matches(&model));
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(ModelStatus::from_str("validated").unwrap(), ModelStatus::Validated);
        assert_eq!(
            AlgorithmKind::from_str("random_forest").unwrap(),
            AlgorithmKind::TreeEnsemble
        );
        assert_eq!(AlgorithmKind::TreeEnsemble.to_string(), "tree_ensemble");
        assert!(AlgorithmKind::from_str("svm").is_err());
    }
}
