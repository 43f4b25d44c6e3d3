//! Storage locations. Unset values select the in-memory stores.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageEnvConfig {
    /// e.g. `sqlite://data/lifecycle.db` or `sqlite::memory:`
    pub database_url: Option<String>,
    /// Directory for content-addressed artifact blobs.
    pub artifact_dir: Option<String>,
}

impl StorageEnvConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            artifact_dir: env::var("ARTIFACT_DIR").ok().filter(|v| !v.trim().is_empty()),
        }
    }
}
