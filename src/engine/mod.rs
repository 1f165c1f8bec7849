//! Activation engine.
//!
//! The continuation chain that lets an activation stay synchronous until
//! something actually returns a future, the four-stage activation pipeline
//! built on it, the error escalation protocol stages hand failures to, and
//! the driver for downstream work detached from the activation that sent it.

pub mod activation;
pub(crate) mod background;
pub mod continuation;
pub mod control;
pub(crate) mod propagation;

pub use activation::{Activation, ActivationSummary};
pub use continuation::{Delivery, Step};
pub use control::{ControlInfo, RunFrame, RunStack, RunStackIter};
