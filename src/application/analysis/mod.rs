pub mod feature_importance;

pub use feature_importance::{FeatureImportanceAnalyzer, permutation_seed};
