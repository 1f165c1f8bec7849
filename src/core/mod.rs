//! Process-local identity and runtime services.
//!
//! A [`Runtime`] is the explicit local domain: it owns the id counters, the
//! arena of node cores and nets, the logger and the `uncaughtNodeError`
//! handlers. Everything built through it shares its ids.

pub mod activation_id;
pub mod config;
pub mod cuuid;
pub mod domain;
pub mod logging;
pub mod runtime;

pub use activation_id::ActivationId;
pub use config::{parse_config, ConfigFormat, RuntimeConfig};
pub use cuuid::cuuid;
pub use domain::{Domain, Group, LocalDomain, PeerSet, RemoteDomain, RemoteGroup, RemoteNode};
pub use logging::{LogLevel, LogRecord, LogSink, Logger, MemorySink, NodeLabel, TracingSink};
pub use runtime::{DomainMonitor, Runtime, RuntimeBuilder};
