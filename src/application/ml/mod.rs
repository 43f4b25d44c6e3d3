// Pluggable estimators and the artifacts they produce
pub mod artifact;
pub mod estimator;
pub mod linear;
pub mod neural;
pub mod scaler;
pub mod tree_ensemble;

pub use artifact::Artifact;
pub use estimator::{FitContext, FittedModel, ModelEstimator, estimator_for};
pub use scaler::FeatureScaler;
