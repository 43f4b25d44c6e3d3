mod candle_repository;
mod feature_importance_repository;
mod model_repository;
mod performance_sample_repository;
mod training_run_repository;
mod walk_forward_repository;

pub use candle_repository::SqliteCandleRepository;
pub use feature_importance_repository::SqliteFeatureImportanceRepository;
pub use model_repository::SqliteModelRepository;
pub use performance_sample_repository::SqlitePerformanceSampleRepository;
pub use training_run_repository::SqliteTrainingRunRepository;
pub use walk_forward_repository::SqliteWalkForwardReportRepository;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// Timestamps are stored as Unix milliseconds.
fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {}", ms))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid uuid in database: {}", value))
}
