use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::priority_queue::Prioritized;
use crate::core::Runtime;
use crate::engine::{ControlInfo, Step};
use crate::error::{EngineError, EngineResult, NodeError};
use crate::nodes::Node;

/// Priority tiers for handlers. Higher fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EventPriority {
    SystemLow = 0,
    Low = 5,
    BelowNormal = 10,
    Normal = 15,
    AboveNormal = 16,
    High = 21,
    SystemHigh = 26,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

impl From<EventPriority> for i32 {
    fn from(priority: EventPriority) -> Self {
        priority as i32
    }
}

/// Events a node core dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEvent {
    NodeWillRun,
    NodeDidRun,
    NodeThrowError,
    NodePortsStateChange,
    /// Shell bookkeeping only; user code cannot register for it.
    CorePortsStateChange,
}

impl NodeEvent {
    pub fn from_name(name: &str) -> EngineResult<Self> {
        match name {
            "nodeWillRun" => Ok(NodeEvent::NodeWillRun),
            "nodeDidRun" => Ok(NodeEvent::NodeDidRun),
            "nodeThrowError" => Ok(NodeEvent::NodeThrowError),
            "nodePortsStateChange" => Ok(NodeEvent::NodePortsStateChange),
            "corePortsStateChange" => Ok(NodeEvent::CorePortsStateChange),
            other => Err(EngineError::InvalidEventRegistration(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeEvent::NodeWillRun => "nodeWillRun",
            NodeEvent::NodeDidRun => "nodeDidRun",
            NodeEvent::NodeThrowError => "nodeThrowError",
            NodeEvent::NodePortsStateChange => "nodePortsStateChange",
            NodeEvent::CorePortsStateChange => "corePortsStateChange",
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, NodeEvent::CorePortsStateChange)
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What changed in a core's port registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorePortsAction {
    Create,
    DetermineDirection,
    ChangeInnerLinkNum,
}

/// What changed in a shell's `portsState` mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortsStateAction {
    Create,
    DetermineDirection,
    ChangeInnerLinkNum,
    ChangeOuterLinkNum,
}

impl From<CorePortsAction> for PortsStateAction {
    fn from(action: CorePortsAction) -> Self {
        match action {
            CorePortsAction::Create => PortsStateAction::Create,
            CorePortsAction::DetermineDirection => PortsStateAction::DetermineDirection,
            CorePortsAction::ChangeInnerLinkNum => PortsStateAction::ChangeInnerLinkNum,
        }
    }
}

/// Argument handed to `nodeWillRun` hooks.
pub struct WillRunArgs<'a> {
    pub data: &'a Value,
    pub control_info: &'a ControlInfo,
    prevented: &'a Arc<AtomicBool>,
}

impl<'a> WillRunArgs<'a> {
    pub(crate) fn new(
        data: &'a Value,
        control_info: &'a ControlInfo,
        prevented: &'a Arc<AtomicBool>,
    ) -> Self {
        Self {
            data,
            control_info,
            prevented,
        }
    }

    /// Skip the body and the `nodeDidRun` hooks of this activation.
    pub fn prevent_running(&self) {
        self.prevented.store(true, Ordering::SeqCst);
    }

    pub fn is_prevented(&self) -> bool {
        self.prevented.load(Ordering::SeqCst)
    }

    /// Owned handle for hooks that decide asynchronously.
    pub fn preventer(&self) -> Preventer {
        Preventer(self.prevented.clone())
    }
}

/// Calls `prevent_running` from inside a pending hook.
#[derive(Debug, Clone)]
pub struct Preventer(Arc<AtomicBool>);

impl Preventer {
    pub fn prevent_running(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Argument handed to `nodeDidRun` hooks.
pub struct DidRunArgs<'a> {
    pub data: &'a Value,
    pub control_info: &'a ControlInfo,
}

pub type WillRunFn = dyn Fn(&Node, &WillRunArgs<'_>) -> anyhow::Result<Step> + Send + Sync;
pub type DidRunFn = dyn Fn(&Node, &DidRunArgs<'_>) -> anyhow::Result<Step> + Send + Sync;
/// Receives `(node, from_child, error)`; returning `true` marks the error handled.
pub type ThrowErrorFn = dyn Fn(&Node, bool, &NodeError) -> bool + Send + Sync;
pub type PortsStateChangeFn = dyn Fn(&Node, &str, PortsStateAction) + Send + Sync;
pub(crate) type CorePortsStateChangeFn = dyn Fn(&Runtime, &str, CorePortsAction) + Send + Sync;

#[derive(Clone)]
pub enum Callback {
    WillRun(Arc<WillRunFn>),
    DidRun(Arc<DidRunFn>),
    ThrowError(Arc<ThrowErrorFn>),
    PortsStateChange(Arc<PortsStateChangeFn>),
    #[doc(hidden)]
    CorePortsStateChange(Arc<CorePortsStateChangeFn>),
}

impl Callback {
    fn event(&self) -> NodeEvent {
        match self {
            Callback::WillRun(_) => NodeEvent::NodeWillRun,
            Callback::DidRun(_) => NodeEvent::NodeDidRun,
            Callback::ThrowError(_) => NodeEvent::NodeThrowError,
            Callback::PortsStateChange(_) => NodeEvent::NodePortsStateChange,
            Callback::CorePortsStateChange(_) => NodeEvent::CorePortsStateChange,
        }
    }

    fn data_ptr(&self) -> *const () {
        match self {
            Callback::WillRun(f) => Arc::as_ptr(f) as *const (),
            Callback::DidRun(f) => Arc::as_ptr(f) as *const (),
            Callback::ThrowError(f) => Arc::as_ptr(f) as *const (),
            Callback::PortsStateChange(f) => Arc::as_ptr(f) as *const (),
            Callback::CorePortsStateChange(f) => Arc::as_ptr(f) as *const (),
        }
    }
}

/// A node event handler together with its priority.
///
/// Clones share the underlying callback, so a clone kept by the caller can be
/// passed to `off` to remove the registration.
#[derive(Clone)]
pub struct NodeHandler {
    priority: i32,
    callback: Callback,
}

impl NodeHandler {
    pub fn will_run<F>(f: F) -> Self
    where
        F: Fn(&Node, &WillRunArgs<'_>) -> anyhow::Result<Step> + Send + Sync + 'static,
    {
        Self::from_callback(Callback::WillRun(Arc::new(f)))
    }

    pub fn did_run<F>(f: F) -> Self
    where
        F: Fn(&Node, &DidRunArgs<'_>) -> anyhow::Result<Step> + Send + Sync + 'static,
    {
        Self::from_callback(Callback::DidRun(Arc::new(f)))
    }

    pub fn throw_error<F>(f: F) -> Self
    where
        F: Fn(&Node, bool, &NodeError) -> bool + Send + Sync + 'static,
    {
        Self::from_callback(Callback::ThrowError(Arc::new(f)))
    }

    pub fn ports_state_change<F>(f: F) -> Self
    where
        F: Fn(&Node, &str, PortsStateAction) + Send + Sync + 'static,
    {
        Self::from_callback(Callback::PortsStateChange(Arc::new(f)))
    }

    pub(crate) fn core_ports_state_change<F>(f: F) -> Self
    where
        F: Fn(&Runtime, &str, CorePortsAction) + Send + Sync + 'static,
    {
        Self::from_callback(Callback::CorePortsStateChange(Arc::new(f)))
            .with_priority(EventPriority::SystemHigh)
    }

    fn from_callback(callback: Callback) -> Self {
        Self {
            priority: EventPriority::default().into(),
            callback,
        }
    }

    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }

    /// The event this handler's callback shape belongs to.
    pub fn event(&self) -> NodeEvent {
        self.callback.event()
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Identity comparison on the shared callback.
    pub fn same_as(&self, other: &NodeHandler) -> bool {
        std::ptr::eq(self.callback.data_ptr(), other.callback.data_ptr())
    }
}

impl Prioritized for NodeHandler {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for NodeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandler")
            .field("event", &self.event())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Events the local domain dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainEvent {
    UncaughtNodeError,
}

impl DomainEvent {
    pub fn from_name(name: &str) -> EngineResult<Self> {
        match name {
            "uncaughtNodeError" => Ok(DomainEvent::UncaughtNodeError),
            other => Err(EngineError::InvalidEventRegistration(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::UncaughtNodeError => "uncaughtNodeError",
        }
    }
}

pub type UncaughtFn = dyn Fn(&NodeError) -> bool + Send + Sync;

/// Handler for `uncaughtNodeError`; returning `true` marks the error handled.
#[derive(Clone)]
pub struct DomainHandler {
    priority: i32,
    callback: Arc<UncaughtFn>,
}

impl DomainHandler {
    pub fn uncaught_node_error<F>(f: F) -> Self
    where
        F: Fn(&NodeError) -> bool + Send + Sync + 'static,
    {
        Self {
            priority: EventPriority::default().into(),
            callback: Arc::new(f),
        }
    }

    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn call(&self, err: &NodeError) -> bool {
        (self.callback)(err)
    }

    pub fn same_as(&self, other: &DomainHandler) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl Prioritized for DomainHandler {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for DomainHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainHandler")
            .field("priority", &self.priority)
            .finish()
    }
}
