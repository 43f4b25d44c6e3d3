use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permutation importance of one feature for one training run.
///
/// Scores are independent per feature and need not sum to 1; `rank` is a
/// strict total order starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub training_run_id: Uuid,
    pub feature_name: String,
    pub feature_index: usize,
    pub importance: f64,
    pub rank: usize,
}
