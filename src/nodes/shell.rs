use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::console::RunConsole;
use super::core::{CoreId, CoreKind, NodeCore, SubnetParts};
use super::subnet::SubnetScope;
use crate::core::{Domain, Group, Runtime};
use crate::engine::{activation, Activation, ControlInfo, Step};
use crate::error::{EngineError, EngineResult};
use crate::event::{CorePortsAction, NodeEvent, NodeHandler, PortsStateAction};
use crate::graph::{
    Direction, Net, NetData, NetParent, ParentRef, Port, PortCache, PortInner, PortSet, Side,
};

/// A shell's view of one port: the core's entry plus its own outer link count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortState {
    pub direction: Direction,
    pub outer_link_num: u32,
    pub inner_link_num: u32,
}

pub(crate) struct ShellInner {
    pub(crate) nid: u32,
    pub(crate) core: Arc<NodeCore>,
    pub(crate) groups: Mutex<Vec<Group>>,
    pub(crate) net: Mutex<Option<Arc<NetData>>>,
    pub(crate) ports: PortCache,
    pub(crate) ports_state: Mutex<BTreeMap<String, PortState>>,
    sync_handler: NodeHandler,
}

impl Drop for ShellInner {
    fn drop(&mut self) {
        self.core
            .off(NodeEvent::CorePortsStateChange, &self.sync_handler);
        if let Some(net) = self.net.get_mut().take() {
            net.prune();
        }
    }
}

/// User-facing handle on a node.
///
/// Clones refer to the same shell. Several shells may share one core (see
/// [`Node::from_core`]); state, body and handlers live on the core, while each
/// shell has its own id, ports, `portsState` and net membership. The core
/// lives as long as one of its shells does.
#[derive(Clone)]
pub struct Node {
    runtime: Runtime,
    shell: Arc<ShellInner>,
}

impl Node {
    /// Declare a primitive node with its initial state and body.
    pub fn new<F>(runtime: &Runtime, state: Value, body: F) -> EngineResult<Node>
    where
        F: Fn(&RunConsole, &Value) -> anyhow::Result<Step> + Send + Sync + 'static,
    {
        let core = runtime.insert_core(|id, registry| {
            NodeCore::new(id, registry, state, Arc::new(body), CoreKind::Node)
        });
        Self::attach(runtime, core)
    }

    /// Declare a subnet whose body forwards entry data into the nested net.
    pub fn subnet<D>(runtime: &Runtime, state: Value, define: D) -> EngineResult<Node>
    where
        D: FnOnce(&SubnetScope) -> EngineResult<()>,
    {
        Self::subnet_with_body(runtime, state, define, |console, data| console.run_net(data))
    }

    /// Declare a subnet with a custom body. `define` runs once, before the
    /// first shell exists, to build the nested graph. Children placed in it
    /// live as long as the subnet core.
    pub fn subnet_with_body<D, F>(
        runtime: &Runtime,
        state: Value,
        define: D,
        body: F,
    ) -> EngineResult<Node>
    where
        D: FnOnce(&SubnetScope) -> EngineResult<()>,
        F: Fn(&RunConsole, &Value) -> anyhow::Result<Step> + Send + Sync + 'static,
    {
        let net = Arc::new(NetData::default());
        let parts = SubnetParts::new(net.clone());
        let core = runtime.insert_core(|id, registry| {
            NodeCore::new(id, registry, state, Arc::new(body), CoreKind::Subnet(parts))
        });
        *net.owner.lock() = Arc::downgrade(&core);
        define(&SubnetScope::new(runtime.clone(), core.clone(), net))?;
        Self::attach(runtime, core)
    }

    /// Another shell over an existing core of this runtime.
    pub fn from_core(runtime: &Runtime, core: CoreId) -> EngineResult<Node> {
        let core = runtime
            .find_core(core)
            .ok_or(EngineError::UnknownCore(core))?;
        Self::attach(runtime, core)
    }

    pub(crate) fn from_shell(runtime: Runtime, shell: Arc<ShellInner>) -> Node {
        Node { runtime, shell }
    }

    fn attach(runtime: &Runtime, core: Arc<NodeCore>) -> EngineResult<Node> {
        let nid = runtime.domain().allocate_node_id()?;
        let shell = Arc::new_cyclic(|weak: &Weak<ShellInner>| {
            // Mirror what the core already knows.
            let ports = PortCache::default();
            let mut ports_state = BTreeMap::new();
            for (name, entry) in core.ports_state() {
                ports_state.insert(
                    name.clone(),
                    PortState {
                        direction: entry.direction,
                        outer_link_num: 0,
                        inner_link_num: entry.inner_link_num,
                    },
                );
                if name != "$IE" {
                    let port = PortInner::new(&name, Side::Outer, &core, Some(weak.clone()), entry.direction);
                    ports.lock().insert(name, Arc::new(port));
                }
            }

            let watched = weak.clone();
            let sync_handler = NodeHandler::core_ports_state_change(move |runtime, name, action| {
                if let Some(shell) = watched.upgrade() {
                    sync_core_port(runtime, &shell, name, action);
                }
            });

            ShellInner {
                nid,
                core: core.clone(),
                groups: Mutex::new(Vec::new()),
                net: Mutex::new(None),
                ports,
                ports_state: Mutex::new(ports_state),
                sync_handler,
            }
        });

        core.on(NodeEvent::CorePortsStateChange, shell.sync_handler.clone());
        core.add_shell(Arc::downgrade(&shell));
        if let Some(inner_net) = core.subnet_net() {
            let mut parent = inner_net.parent.lock();
            let vacant = match parent.as_ref() {
                None => true,
                Some(NetParent::Subnet(current)) => current.strong_count() == 0,
                Some(NetParent::Remote(_)) => false,
            };
            if vacant {
                *parent = Some(NetParent::Subnet(Arc::downgrade(&shell)));
            }
        }

        Ok(Node {
            runtime: runtime.clone(),
            shell,
        })
    }

    pub(crate) fn shell(&self) -> &Arc<ShellInner> {
        &self.shell
    }

    /// The core behind this shell, shared with every other shell over it.
    pub fn core(&self) -> Arc<NodeCore> {
        self.shell.core.clone()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn nid(&self) -> u32 {
        self.shell.nid
    }

    pub fn core_id(&self) -> CoreId {
        self.shell.core.id()
    }

    pub fn brand(&self) -> String {
        self.core().brand()
    }

    pub fn set_brand(&self, brand: &str) {
        self.core().set_brand(brand);
    }

    pub fn is_subnet(&self) -> bool {
        self.core().is_subnet()
    }

    pub fn domain(&self) -> &Domain {
        self.runtime.domain().identity()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.shell.groups.lock().clone()
    }

    pub fn join_group(&self, group: Group) {
        let mut groups = self.shell.groups.lock();
        if !groups.contains(&group) {
            groups.push(group);
        }
    }

    /// The net this shell sits in. A shell outside any net gets a fresh
    /// root net on first access.
    pub fn net(&self) -> Net {
        let data = {
            let mut slot = self.shell.net.lock();
            match slot.as_ref() {
                Some(data) => data.clone(),
                None => {
                    let data = Arc::new(NetData::default());
                    data.join(&self.shell);
                    *slot = Some(data.clone());
                    data
                }
            }
        };
        Net::from_data(self.runtime.clone(), data)
    }

    pub fn parent(&self) -> Option<ParentRef> {
        let data = self.shell.net.lock().clone()?;
        Net::from_data(self.runtime.clone(), data).parent()
    }

    // ---- ports ----

    pub fn ports(&self) -> PortSet {
        PortSet::new(
            self.runtime.clone(),
            Side::Outer,
            self.shell.core.clone(),
            Some(Arc::downgrade(&self.shell)),
            self.shell.ports.clone(),
        )
    }

    /// Shorthand for `ports().get(name, None)`.
    pub fn port(&self, name: &str) -> EngineResult<Port> {
        self.ports().get(name, None)
    }

    pub fn inner_ports(&self) -> EngineResult<PortSet> {
        let cache = self
            .core()
            .inner_port_cache()
            .ok_or(EngineError::NotASubnet(self.nid()))?;
        Ok(PortSet::new(
            self.runtime.clone(),
            Side::Inner,
            self.shell.core.clone(),
            None,
            cache,
        ))
    }

    pub fn inner_port(&self, name: &str) -> EngineResult<Port> {
        self.inner_ports()?.get(name, None)
    }

    /// The nested net of a subnet.
    pub fn subnet_net(&self) -> EngineResult<Net> {
        let net = self
            .shell
            .core
            .subnet_net()
            .ok_or(EngineError::NotASubnet(self.nid()))?;
        Ok(Net::from_data(self.runtime.clone(), net))
    }

    pub fn children(&self) -> EngineResult<Vec<Node>> {
        Ok(self.subnet_net()?.nodes())
    }

    pub fn ports_state(&self) -> BTreeMap<String, PortState> {
        self.shell.ports_state.lock().clone()
    }

    pub fn port_state(&self, name: &str) -> Option<PortState> {
        self.shell.ports_state.lock().get(name).copied()
    }

    pub(crate) fn change_outer_link_num(&self, name: &str, delta: i64) {
        {
            let mut states = self.shell.ports_state.lock();
            let Some(state) = states.get_mut(name) else {
                return;
            };
            state.outer_link_num = (state.outer_link_num as i64 + delta).max(0) as u32;
        }
        self.core()
            .emit_ports_state_change(self, name, PortsStateAction::ChangeOuterLinkNum);
    }

    // ---- state ----

    pub fn state(&self) -> Value {
        self.core().state()
    }

    pub fn set_state(&self, state: Value) {
        self.core().set_state(state);
    }

    pub fn update_state<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        self.core().update_state(f)
    }

    // ---- events ----

    /// Register `handler` for `event` on the core.
    pub fn on(&self, event: NodeEvent, handler: NodeHandler) -> EngineResult<()> {
        if event.is_reserved() {
            return Err(EngineError::InvalidEventRegistration(event.name().to_string()));
        }
        if handler.event() != event {
            return Err(EngineError::HandlerEventMismatch {
                event: event.name().to_string(),
                handler: handler.event().name().to_string(),
            });
        }
        self.core().on(event, handler);
        Ok(())
    }

    pub fn on_named(&self, event: &str, handler: NodeHandler) -> EngineResult<()> {
        self.on(NodeEvent::from_name(event)?, handler)
    }

    pub fn off(&self, event: NodeEvent, handler: &NodeHandler) -> bool {
        if event.is_reserved() {
            return false;
        }
        self.core().off(event, handler)
    }

    // ---- activation ----

    /// Run one activation with `data` arriving as described by `control_info`.
    pub fn activate(&self, data: Value, control_info: ControlInfo) -> Activation {
        activation::activate(self, data, control_info)
    }

    /// Feed `data` into the default input port.
    pub fn invoke(&self, data: Value) -> EngineResult<Activation> {
        let port = self
            .ports()
            .get(&self.runtime.config().default_input_port, Some(Direction::In))?;
        Ok(self.activate(data, ControlInfo::with_port(port)))
    }
}

/// Keep a shell's ports and `portsState` in step with its core.
fn sync_core_port(runtime: &Runtime, shell: &Arc<ShellInner>, name: &str, action: CorePortsAction) {
    let core = &shell.core;
    let Some(entry) = core.port_entry(name) else {
        return;
    };
    {
        let mut states = shell.ports_state.lock();
        let state = states.entry(name.to_string()).or_insert(PortState {
            direction: entry.direction,
            outer_link_num: 0,
            inner_link_num: entry.inner_link_num,
        });
        state.direction = entry.direction;
        state.inner_link_num = entry.inner_link_num;
    }
    if name != "$IE" {
        let port = shell.ports.lock().get(name).cloned();
        match port {
            Some(port) => {
                port.apply_direction(entry.direction);
            }
            None => {
                let port = PortInner::new(name, Side::Outer, core, Some(Arc::downgrade(shell)), entry.direction);
                shell.ports.lock().entry(name.to_string()).or_insert_with(|| Arc::new(port));
            }
        }
    }
    let node = Node::from_shell(runtime.clone(), shell.clone());
    core.emit_ports_state_change(&node, name, action.into());
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shell, &other.shell)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("nid", &self.nid())
            .field("brand", &self.brand())
            .field("core", &self.shell.core.id())
            .finish()
    }
}
