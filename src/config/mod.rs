//! Configuration module for the lifecycle engine.
//!
//! Structured configuration loaded from environment variables or a TOML
//! file, organized by concern: Features, Validation, Drift, Registry and
//! Storage. Every tunable threshold of the engine lives here.

mod drift_env_config;
mod feature_env_config;
mod registry_env_config;
mod storage_env_config;
mod validation_env_config;

pub use drift_env_config::DriftEnvConfig;
pub use feature_env_config::FeatureEnvConfig;
pub use registry_env_config::RegistryEnvConfig;
pub use storage_env_config::StorageEnvConfig;
pub use validation_env_config::ValidationEnvConfig;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Main engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FeatureEnvConfig,
    pub validation: ValidationEnvConfig,
    pub drift: DriftEnvConfig,
    pub registry: RegistryEnvConfig,
    pub storage: StorageEnvConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            features: FeatureEnvConfig::from_env()?,
            validation: ValidationEnvConfig::from_env()?,
            drift: DriftEnvConfig::from_env()?,
            registry: RegistryEnvConfig::from_env()?,
            storage: StorageEnvConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file; missing sections and keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.validation.validate()?;
        self.drift.validate()?;
        self.registry.validate()?;
        Ok(())
    }
}

/// Reads `key` from the environment, falling back to `default` when unset.
pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Failed to parse {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn ensure_fraction(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{} must be within [0, 1], got {}", name, value);
    }
    Ok(())
}
