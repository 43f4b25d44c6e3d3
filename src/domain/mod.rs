// Market data types (bars, timeframes)
pub mod market;

// Lifecycle entities
pub mod model;

// Feature registry shared by builder and artifacts
pub mod ml;

// Lifecycle events and listeners
pub mod events;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Data integrity checks
pub mod validation;

// Domain-specific error types
pub mod errors;
