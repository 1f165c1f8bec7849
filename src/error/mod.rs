//! Error types for the runtime.
//!
//! - [`EngineError`]: construction-time defects (direction conflicts, reserved
//!   names, bad event registrations). Returned immediately at the call site.
//! - [`NodeError`]: a failure captured at an activation stage boundary. Never
//!   returned to the caller; routed through the propagation protocol instead.

pub mod engine_error;
pub mod node_error;

pub use engine_error::EngineError;
pub use node_error::{NodeError, WorkingStage};

/// Convenience alias for engine-level results.
pub type EngineResult<T> = Result<T, EngineError>;
