pub mod trainer;
pub mod training_service;

pub use trainer::{Trainer, TrainingOutcome};
pub use training_service::{TrainingRequest, TrainingService};
