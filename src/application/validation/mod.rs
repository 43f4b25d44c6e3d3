pub mod validation_service;
pub mod walk_forward;

pub use validation_service::{ValidationRequest, ValidationService};
pub use walk_forward::WalkForwardValidator;
