//! Priority-ordered event dispatch.
//!
//! Handlers fire in descending priority; equal priorities fire in
//! registration order. Node cores and the local domain each own an
//! [`EventEmitter`] keyed by their event enum.

pub mod emitter;
pub mod node_event;
pub mod priority_queue;

pub use emitter::EventEmitter;
pub use node_event::{
    Callback, CorePortsAction, DidRunArgs, DomainEvent, DomainHandler, EventPriority, NodeEvent,
    NodeHandler, PortsStateAction, Preventer, WillRunArgs,
};
pub use priority_queue::{PriorityQueue, Prioritized};
