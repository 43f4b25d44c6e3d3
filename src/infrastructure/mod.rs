pub mod artifact_store;
pub mod event_bus;
pub mod observability;
pub mod persistence;
pub mod repositories;

pub use artifact_store::FsArtifactStore;
pub use event_bus::{EventBus, RecordingListener};
pub use observability::{Metrics, MetricsListener};
pub use persistence::Database;
