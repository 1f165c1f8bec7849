use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::nodes::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Info = 3,
    Debug = 4,
}

/// Diagnostic label for the node a message concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabel {
    pub nid: u32,
    pub brand: String,
}

impl NodeLabel {
    pub fn of(node: &Node) -> Self {
        Self {
            nid: node.nid(),
            brand: node.brand(),
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.nid, self.brand)
    }
}

#[derive(Debug, Clone)]
pub enum LogRecord {
    Message(String),
    WithNode {
        msg: String,
        node: Option<NodeLabel>,
        component: Option<String>,
    },
    NodeError(NodeError),
}

impl LogRecord {
    /// A message tagged with its originating node and component.
    pub fn with_node(msg: impl Into<String>, node: Option<&Node>, component: Option<&str>) -> Self {
        LogRecord::WithNode {
            msg: msg.into(),
            node: node.map(NodeLabel::of),
            component: component.map(str::to_string),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Message(msg) => f.write_str(msg),
            LogRecord::WithNode {
                msg,
                node,
                component,
            } => {
                if let Some(component) = component {
                    write!(f, "[{}] ", component)?;
                }
                if let Some(node) = node {
                    write!(f, "({}) ", node)?;
                }
                f.write_str(msg)
            }
            LogRecord::NodeError(err) => write!(f, "{}", err),
        }
    }
}

/// A destination for log records.
pub trait LogSink: Send + Sync {
    fn input(&self, level: LogLevel, record: &LogRecord);
}

/// Forwards records to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn input(&self, level: LogLevel, record: &LogRecord) {
        let (node, component) = match record {
            LogRecord::WithNode {
                node, component, ..
            } => (
                node.as_ref().map(|n| n.to_string()),
                component.clone(),
            ),
            LogRecord::NodeError(err) => (Some(NodeLabel::of(&err.node).to_string()), None),
            LogRecord::Message(_) => (None, None),
        };
        let node = node.unwrap_or_default();
        let component = component.unwrap_or_default();
        match level {
            LogLevel::Off => {}
            LogLevel::Error => tracing::error!(node = %node, component = %component, message = %record),
            LogLevel::Warn => tracing::warn!(node = %node, component = %component, message = %record),
            LogLevel::Info => tracing::info!(node = %node, component = %component, message = %record),
            LogLevel::Debug => tracing::debug!(node = %node, component = %component, message = %record),
        }
    }
}

/// Keeps rendered records in memory; useful for asserting on log output.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().clone()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn input(&self, level: LogLevel, record: &LogRecord) {
        self.records.lock().push((level, record.to_string()));
    }
}

/// Leveled fan-out to every registered sink.
pub struct Logger {
    level: RwLock<LogLevel>,
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
}

impl Logger {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: RwLock::new(level),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn level(&self) -> LogLevel {
        *self.level.read()
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.write() = level;
    }

    pub fn register(&self, sink: Arc<dyn LogSink>) {
        self.sinks.write().push(sink);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level()
    }

    pub fn log(&self, level: LogLevel, record: LogRecord) {
        if !self.enabled(level) {
            return;
        }
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.input(level, &record);
        }
    }

    pub fn error(&self, record: LogRecord) {
        self.log(LogLevel::Error, record);
    }

    pub fn warn(&self, record: LogRecord) {
        self.log(LogLevel::Warn, record);
    }

    pub fn info(&self, record: LogRecord) {
        self.log(LogLevel::Info, record);
    }

    pub fn debug(&self, record: LogRecord) {
        self.log(LogLevel::Debug, record);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}
