// Lifecycle entities: models, runs, reports and their children
pub mod artifact;
pub mod feature_importance;
pub mod hyperparameters;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod model;
pub mod performance_sample;
pub mod training_run;
pub mod walk_forward;

pub use artifact::{ArtifactRef, checksum_of};
pub use feature_importance::FeatureImportance;
pub use hyperparameters::Hyperparameters;
pub use metrics::ClassificationMetrics;
pub use model::{AlgorithmKind, ChildModelSpec, Model, ModelFilter, ModelStatus, NewModel};
pub use performance_sample::PerformanceSample;
pub use training_run::{DataRange, RowRange, RunPurpose, RunStatus, SplitBoundaries, TrainingRun};
pub use walk_forward::{
    Recommendation, RecommendationPolicy, WalkForwardAggregate, WalkForwardReport, WindowConfig,
    WindowResult, WindowType,
};
