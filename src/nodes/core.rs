use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::console::RunConsole;
use super::shell::ShellInner;
use crate::core::runtime::CoreRegistry;
use crate::core::{LogRecord, Runtime};
use crate::engine::Step;
use crate::error::{EngineError, EngineResult};
use crate::event::node_event::{DidRunFn, ThrowErrorFn, WillRunFn};
use crate::event::{Callback, CorePortsAction, EventEmitter, NodeEvent, NodeHandler, PortsStateAction};
use crate::graph::{Direction, NetData, PortCache};
use crate::nodes::Node;

/// Identity of a core: the runtime that minted it and an index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId {
    runtime: u64,
    index: u64,
}

impl CoreId {
    pub(crate) fn new(runtime: u64, index: u64) -> Self {
        Self { runtime, index }
    }

    pub(crate) fn runtime_serial(&self) -> u64 {
        self.runtime
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.runtime, self.index)
    }
}

/// The user-supplied run function of a node.
pub type NodeBody = Arc<dyn Fn(&RunConsole, &Value) -> anyhow::Result<Step> + Send + Sync>;

/// Canonical registry entry for one port name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorePortState {
    pub direction: Direction,
    pub inner_link_num: u32,
}

/// What a subnet core owns beyond a plain node: the nested net, its inner
/// ports and the children placed in it.
pub struct SubnetParts {
    net: Arc<NetData>,
    inner_ports: PortCache,
    children: Mutex<Vec<Arc<ShellInner>>>,
}

impl SubnetParts {
    pub(crate) fn new(net: Arc<NetData>) -> Self {
        Self {
            net,
            inner_ports: PortCache::default(),
            children: Mutex::new(Vec::new()),
        }
    }
}

pub enum CoreKind {
    Node,
    Subnet(SubnetParts),
}

/// Logical identity of a node: state, body, port registry and handlers.
///
/// Any number of shells may observe one core. They own it; the core holds
/// them weakly and goes away with the last one.
pub struct NodeCore {
    id: CoreId,
    registry: Weak<CoreRegistry>,
    brand: Mutex<String>,
    state: Mutex<Value>,
    body: NodeBody,
    ports: Mutex<BTreeMap<String, CorePortState>>,
    events: Mutex<EventEmitter<NodeEvent, NodeHandler>>,
    shells: Mutex<Vec<Weak<ShellInner>>>,
    kind: CoreKind,
}

impl NodeCore {
    pub(crate) fn new(
        id: CoreId,
        registry: Weak<CoreRegistry>,
        state: Value,
        body: NodeBody,
        kind: CoreKind,
    ) -> Self {
        let brand = match kind {
            CoreKind::Node => "NodeCore",
            CoreKind::Subnet(_) => "SubnetCore",
        };
        Self {
            id,
            registry,
            brand: Mutex::new(brand.to_string()),
            state: Mutex::new(state),
            body,
            ports: Mutex::new(BTreeMap::new()),
            events: Mutex::new(EventEmitter::new()),
            shells: Mutex::new(Vec::new()),
            kind,
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn brand(&self) -> String {
        self.brand.lock().clone()
    }

    pub fn set_brand(&self, brand: &str) {
        *self.brand.lock() = brand.to_string();
    }

    pub fn kind(&self) -> &CoreKind {
        &self.kind
    }

    pub fn is_subnet(&self) -> bool {
        matches!(self.kind, CoreKind::Subnet(_))
    }

    pub(crate) fn subnet_net(&self) -> Option<Arc<NetData>> {
        match &self.kind {
            CoreKind::Subnet(parts) => Some(parts.net.clone()),
            CoreKind::Node => None,
        }
    }

    /// Keep a shell placed in this subnet's nested net alive.
    pub(crate) fn adopt(&self, shell: &Arc<ShellInner>) {
        if let CoreKind::Subnet(parts) = &self.kind {
            let mut children = parts.children.lock();
            if !children.iter().any(|c| Arc::ptr_eq(c, shell)) {
                children.push(shell.clone());
            }
        }
    }

    pub(crate) fn release(&self, shell: &Arc<ShellInner>) {
        if let CoreKind::Subnet(parts) = &self.kind {
            parts.children.lock().retain(|c| !Arc::ptr_eq(c, shell));
        }
    }

    pub(crate) fn inner_port_cache(&self) -> Option<PortCache> {
        match &self.kind {
            CoreKind::Subnet(parts) => Some(parts.inner_ports.clone()),
            CoreKind::Node => None,
        }
    }

    // ---- state ----

    pub fn state(&self) -> Value {
        self.state.lock().clone()
    }

    pub fn set_state(&self, state: Value) {
        *self.state.lock() = state;
    }

    pub fn update_state<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) fn body(&self) -> NodeBody {
        self.body.clone()
    }

    // ---- port registry ----

    pub fn port_entry(&self, name: &str) -> Option<CorePortState> {
        self.ports.lock().get(name).copied()
    }

    pub fn port_direction(&self, name: &str) -> Option<Direction> {
        self.port_entry(name).map(|entry| entry.direction)
    }

    pub fn ports_state(&self) -> BTreeMap<String, CorePortState> {
        self.ports.lock().clone()
    }

    /// Create or update the registry entry for `name` and notify every shell.
    ///
    /// A missing entry is created (`Create`). A different direction is only
    /// accepted while the entry is still `Unknown` (`DetermineDirection`). A
    /// different inner link count is recorded on subnet cores
    /// (`ChangeInnerLinkNum`).
    pub(crate) fn set_core_ports_state(
        &self,
        runtime: &Runtime,
        name: &str,
        direction: Option<Direction>,
        inner_link_num: Option<u32>,
    ) -> EngineResult<()> {
        let direction = direction.filter(|d| *d != Direction::Unknown);
        let action = {
            let mut ports = self.ports.lock();
            match ports.get_mut(name) {
                None => {
                    ports.insert(
                        name.to_string(),
                        CorePortState {
                            direction: direction.unwrap_or(Direction::Unknown),
                            inner_link_num: inner_link_num.unwrap_or(0),
                        },
                    );
                    Some(CorePortsAction::Create)
                }
                Some(entry) => match direction.filter(|d| *d != entry.direction) {
                    Some(requested) if entry.direction != Direction::Unknown => {
                        let current = entry.direction;
                        runtime.logger().error(LogRecord::with_node(
                            format!(
                                "cannot change the direction of port \"{}\" once determined",
                                name
                            ),
                            None,
                            Some("NodeCore::set_core_ports_state"),
                        ));
                        return Err(EngineError::PortDirectionConflict {
                            port: name.to_string(),
                            current,
                            requested,
                        });
                    }
                    Some(requested) => {
                        entry.direction = requested;
                        Some(CorePortsAction::DetermineDirection)
                    }
                    None => match inner_link_num {
                        Some(count) if count != entry.inner_link_num && self.is_subnet() => {
                            entry.inner_link_num = count;
                            Some(CorePortsAction::ChangeInnerLinkNum)
                        }
                        _ => None,
                    },
                },
            }
        };

        let Some(action) = action else {
            return Ok(());
        };
        if action == CorePortsAction::DetermineDirection {
            if let Some(cache) = self.inner_port_cache() {
                let inner = cache.lock().get(name).cloned();
                if let (Some(inner), Some(dir)) = (inner, direction) {
                    inner.apply_direction(dir);
                }
            }
        }
        self.emit_core_ports_state_change(runtime, name, action);
        Ok(())
    }

    // ---- events ----

    pub(crate) fn on(&self, event: NodeEvent, handler: NodeHandler) {
        self.events.lock().on(event, handler);
    }

    pub(crate) fn off(&self, event: NodeEvent, handler: &NodeHandler) -> bool {
        self.events.lock().off(&event, |h| h.same_as(handler))
    }

    pub fn handler_count(&self, event: NodeEvent) -> usize {
        self.events.lock().handler_count(&event)
    }

    fn handlers(&self, event: NodeEvent) -> Vec<NodeHandler> {
        self.events.lock().snapshot(&event)
    }

    pub(crate) fn will_run_hooks(&self) -> Vec<Arc<WillRunFn>> {
        self.handlers(NodeEvent::NodeWillRun)
            .into_iter()
            .filter_map(|h| match h.callback() {
                Callback::WillRun(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn did_run_hooks(&self) -> Vec<Arc<DidRunFn>> {
        self.handlers(NodeEvent::NodeDidRun)
            .into_iter()
            .filter_map(|h| match h.callback() {
                Callback::DidRun(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn throw_error_handlers(&self) -> Vec<Arc<ThrowErrorFn>> {
        self.handlers(NodeEvent::NodeThrowError)
            .into_iter()
            .filter_map(|h| match h.callback() {
                Callback::ThrowError(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    fn emit_core_ports_state_change(&self, runtime: &Runtime, name: &str, action: CorePortsAction) {
        for handler in self.handlers(NodeEvent::CorePortsStateChange) {
            if let Callback::CorePortsStateChange(f) = handler.callback() {
                f(runtime, name, action);
            }
        }
    }

    pub(crate) fn emit_ports_state_change(&self, node: &Node, name: &str, action: PortsStateAction) {
        for handler in self.handlers(NodeEvent::NodePortsStateChange) {
            if let Callback::PortsStateChange(f) = handler.callback() {
                f(node, name, action);
            }
        }
    }

    // ---- shells ----

    pub(crate) fn add_shell(&self, shell: Weak<ShellInner>) {
        let mut shells = self.shells.lock();
        shells.retain(|s| s.strong_count() > 0);
        shells.push(shell);
    }

    pub fn shell_count(&self) -> usize {
        self.shells
            .lock()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }
}

impl Drop for NodeCore {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id.index);
        }
    }
}

impl std::fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("brand", &self.brand())
            .field("subnet", &self.is_subnet())
            .field("ports", &self.ports_state())
            .finish()
    }
}
