//! Programmer errors raised while building or wiring a graph.

use thiserror::Error;

use crate::graph::Direction;
use crate::nodes::CoreId;

/// Construction-time errors.
///
/// These indicate a defect in how the graph was declared rather than a
/// runtime data condition, so they are never turned into a [`NodeError`](super::NodeError).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Port direction conflict on \"{port}\": already {current:?}, requested {requested:?}")]
    PortDirectionConflict {
        port: String,
        current: Direction,
        requested: Direction,
    },
    #[error("Reserved port name: {0}")]
    ReservedPortName(String),
    #[error("Invalid port name: {0:?} (port names start with '$')")]
    InvalidPortName(String),
    #[error("Invalid event registration: {0}")]
    InvalidEventRegistration(String),
    #[error("Handler for {handler} cannot be registered under {event}")]
    HandlerEventMismatch { event: String, handler: String },
    #[error("Invalid link: {0}")]
    InvalidLink(String),
    #[error("Node {0} is not a subnet")]
    NotASubnet(u32),
    #[error("Unknown node core: {0}")]
    UnknownCore(CoreId),
    #[error("Id space exhausted: no {0} ids left")]
    IdSpaceExhausted(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
