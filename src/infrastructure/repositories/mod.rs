pub mod in_memory;

pub use in_memory::{
    InMemoryArtifactStore, InMemoryBarSource, InMemoryFeatureImportanceRepository,
    InMemoryModelRepository, InMemoryPerformanceSampleRepository, InMemoryTrainingRunRepository,
    InMemoryWalkForwardReportRepository,
};
