//! # xnet: a flow-based execution runtime
//!
//! `xnet` runs graphs of stateful nodes that exchange data through named,
//! directional ports:
//!
//! - **Nodes and shells**: a [`NodeCore`] holds state, body and handlers; any
//!   number of [`Node`] shells can share one core, each with its own id,
//!   ports and net membership.
//! - **Ports**: created lazily, direction inferred from use and fixed once
//!   known. `$E` is always an output, `$IE` (subnet inner side) always an input.
//! - **Subnets**: nodes that contain a nested [`Net`] and route data between
//!   their outer and inner ports.
//! - **Activation**: every activation passes `NodeWillRun`, `NodeIsRunning`,
//!   `NodeDidRun` and `NodeStopped`. It completes in place when everything is
//!   synchronous and only becomes a future once a hook or body returns one.
//!   Downstream work that does not finish in place is detached onto the
//!   runtime; [`Runtime::settle`] waits for it.
//! - **Errors**: failures become a [`NodeError`] that escalates from node
//!   handlers to the `$E` port, then to the parent subnet, then to the domain.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use xnet::{connect, Node, Runtime, Step};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::new();
//!     let double = Node::new(&runtime, json!(null), |console, data| {
//!         console.emit("$O", json!(data.as_i64().unwrap_or(0) * 2))?;
//!         Ok(Step::Done)
//!     })?;
//!     let sink = Node::new(&runtime, json!([]), |console, data| {
//!         console.update_state(|s| s.as_array_mut().map(|a| a.push(data.clone())));
//!         Ok(Step::Done)
//!     })?;
//!     connect(&double.port("$O")?, &sink.port("$I")?)?;
//!
//!     double.invoke(json!(21))?.await;
//!     runtime.settle().await;
//!     assert_eq!(sink.state(), json!([42]));
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod nodes;

pub use crate::core::{
    parse_config, ConfigFormat, DomainMonitor, LogLevel, LogRecord, LogSink, Runtime,
    RuntimeBuilder, RuntimeConfig,
};
pub use crate::engine::{Activation, ActivationSummary, ControlInfo, Delivery, RunStack, Step};
pub use crate::error::{EngineError, EngineResult, NodeError, WorkingStage};
pub use crate::event::{DomainEvent, DomainHandler, EventPriority, NodeEvent, NodeHandler};
pub use crate::graph::{connect, disconnect, Direction, Net, Port, PortSet, Side};
pub use crate::nodes::{Node, NodeCore, RunConsole, SubnetScope};
