//! Node cores, shells and the run console.
//!
//! A [`NodeCore`] holds what a node *is*: state, body, the canonical port
//! registry and event handlers. A [`Node`] shell is how it is *used*: it has
//! its own id, ports, `portsState` mirror and net membership, kept in sync with
//! the core through a system-priority `corePortsStateChange` listener.

pub mod console;
pub mod core;
pub mod shell;
pub mod subnet;

pub use console::{Entry, RunConsole};
pub use self::core::{CoreId, CoreKind, CorePortState, NodeBody, NodeCore, SubnetParts};
pub(crate) use shell::ShellInner;
pub use shell::{Node, PortState};
pub use subnet::SubnetScope;
