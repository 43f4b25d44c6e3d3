// Feature importance
pub mod analysis;
pub mod bootstrap;

// Bars -> labelled datasets and splits
pub mod dataset;
pub mod features;

// Facade and background jobs
pub mod engine;
pub mod jobs;

// Estimators, scaler and serialized artifacts
pub mod ml;

// Live drift tracking
pub mod monitoring;

pub mod registry;
pub mod training;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;
