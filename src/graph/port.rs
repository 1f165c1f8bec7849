use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::net::NetParent;
use crate::core::{LogRecord, Runtime};
use crate::engine::{ControlInfo, Delivery};
use crate::error::{EngineError, EngineResult};
use crate::nodes::{CoreId, Node, NodeCore, ShellInner};

/// Direction of a port from its node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Out = 0,
    In = 1,
    Unknown = 2,
}

/// Which face of a node a port sits on. Inner ports only exist on subnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Outer = 0,
    Inner = 1,
}

/// The direction data physically travels through a port: `side XOR direction`.
///
/// An inner `Out` port receives from the children, an inner `In` port sends
/// to them.
pub fn transfer_direction(direction: Direction, side: Side) -> Direction {
    match (direction, side) {
        (Direction::Unknown, _) => Direction::Unknown,
        (dir, Side::Outer) => dir,
        (Direction::Out, Side::Inner) => Direction::In,
        (Direction::In, Side::Inner) => Direction::Out,
    }
}

/// The direction that makes a port on `side` transfer along `transfer`.
pub(crate) fn direction_for_transfer(transfer: Direction, side: Side) -> Direction {
    transfer_direction(transfer, side)
}

pub fn is_port_name(name: &str) -> bool {
    name.len() > 1 && name.starts_with('$')
}

/// Directions fixed by reserved names.
pub(crate) fn reserved_direction(name: &str) -> Option<Direction> {
    match name {
        "$E" => Some(Direction::Out),
        "$IE" => Some(Direction::In),
        _ => None,
    }
}

struct PortState {
    direction: Direction,
    links: Vec<Weak<PortInner>>,
}

pub(crate) struct PortInner {
    name: String,
    side: Side,
    core_id: CoreId,
    core: Weak<NodeCore>,
    shell: Option<Weak<ShellInner>>,
    state: Mutex<PortState>,
}

impl PortInner {
    pub(crate) fn new(
        name: &str,
        side: Side,
        core: &Arc<NodeCore>,
        shell: Option<Weak<ShellInner>>,
        direction: Direction,
    ) -> Self {
        Self {
            name: name.to_string(),
            side,
            core_id: core.id(),
            core: Arc::downgrade(core),
            shell,
            state: Mutex::new(PortState {
                direction,
                links: Vec::new(),
            }),
        }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    /// Adopt a direction decided elsewhere. Only moves away from `Unknown`.
    pub(crate) fn apply_direction(&self, direction: Direction) -> bool {
        let mut state = self.state.lock();
        if direction == Direction::Unknown || state.direction == direction {
            return false;
        }
        if state.direction != Direction::Unknown {
            return false;
        }
        state.direction = direction;
        true
    }
}

/// A named, directional endpoint on a node.
///
/// Handles are cheap to clone; two handles for the same name on the same
/// shell (or the same subnet's inner side) point at one port.
#[derive(Clone)]
pub struct Port {
    runtime: Runtime,
    inner: Arc<PortInner>,
}

impl Port {
    pub(crate) fn from_inner(runtime: Runtime, inner: Arc<PortInner>) -> Self {
        Self { runtime, inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn side(&self) -> Side {
        self.inner.side
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction()
    }

    pub fn transfer_direction(&self) -> Direction {
        transfer_direction(self.direction(), self.side())
    }

    pub fn core_id(&self) -> CoreId {
        self.inner.core_id
    }

    pub(crate) fn core(&self) -> EngineResult<Arc<NodeCore>> {
        self.inner
            .core
            .upgrade()
            .ok_or(EngineError::UnknownCore(self.inner.core_id))
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The shell this outer port belongs to. `None` for inner ports.
    pub fn node(&self) -> Option<Node> {
        let shell = self.inner.shell.as_ref()?.upgrade()?;
        Some(Node::from_shell(self.runtime.clone(), shell))
    }

    pub fn links(&self) -> Vec<Port> {
        self.inner
            .state
            .lock()
            .links
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Port::from_inner(self.runtime.clone(), inner))
            .collect()
    }

    pub fn link_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .links
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    pub fn is_linked_to(&self, other: &Port) -> bool {
        let target = Arc::downgrade(&other.inner);
        self.inner
            .state
            .lock()
            .links
            .iter()
            .any(|l| l.ptr_eq(&target))
    }

    pub fn ptr_eq(&self, other: &Port) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn add_link(&self, other: &Port) {
        self.inner.state.lock().links.push(Arc::downgrade(&other.inner));
    }

    pub(crate) fn remove_link(&self, other: &Port) -> bool {
        let target = Arc::downgrade(&other.inner);
        let mut state = self.inner.state.lock();
        match state.links.iter().position(|l| l.ptr_eq(&target)) {
            Some(index) => {
                state.links.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn set_direction(&self, direction: Direction) -> EngineResult<()> {
        self.set_direction_with(direction, true)
    }

    /// Resolve `direction` against reserved names and the core registry, then
    /// store it. A port direction, once known, never changes.
    pub fn set_direction_with(&self, direction: Direction, notify_core: bool) -> EngineResult<()> {
        let resolved = self.check_or_resolve(direction)?;
        if !self.inner.apply_direction(resolved) {
            return Ok(());
        }
        if notify_core {
            self.core()?
                .set_core_ports_state(&self.runtime, self.name(), Some(resolved), None)?;
        }
        Ok(())
    }

    fn check_or_resolve(&self, direction: Direction) -> EngineResult<Direction> {
        let name = self.name();
        let current = self.direction();
        let core_direction = self.core()?.port_direction(name);

        if direction == Direction::Unknown {
            if let Some(reserved) = reserved_direction(name) {
                return Ok(reserved);
            }
            return Ok(match core_direction {
                Some(dir) if dir != Direction::Unknown => dir,
                _ => current,
            });
        }

        if let Some(reserved) = reserved_direction(name) {
            if reserved != direction {
                return Err(self.conflict(reserved, direction));
            }
        }
        if let Some(core_dir) = core_direction {
            if core_dir != Direction::Unknown && core_dir != direction {
                return Err(self.conflict(core_dir, direction));
            }
        }
        if current != Direction::Unknown && current != direction {
            return Err(self.conflict(current, direction));
        }
        Ok(direction)
    }

    fn conflict(&self, current: Direction, requested: Direction) -> EngineError {
        self.runtime.logger().error(LogRecord::with_node(
            format!(
                "cannot set port \"{}\" to {:?}, its direction is already {:?}",
                self.name(),
                requested,
                current
            ),
            self.node().as_ref(),
            Some("Port::set_direction"),
        ));
        EngineError::PortDirectionConflict {
            port: self.name().to_string(),
            current,
            requested,
        }
    }

    /// Send `data` to every linked port that receives.
    pub fn output(&self, data: Value, control_info: ControlInfo) -> Delivery {
        let targets: Vec<Port> = self
            .links()
            .into_iter()
            .filter(|p| p.transfer_direction() == Direction::In)
            .collect();
        match targets.len() {
            0 => Delivery::Done,
            1 => targets[0].input(data, control_info),
            _ => Delivery::join(
                targets
                    .iter()
                    .map(|target| target.input(data.clone(), control_info.clone())),
            ),
        }
    }

    /// Accept `data` arriving over a link.
    ///
    /// An outer port activates its node with this port as the entry. A
    /// subnet's inner port passes the data out through the subnet's outer port
    /// of the same name.
    pub fn input(&self, data: Value, control_info: ControlInfo) -> Delivery {
        let run_stack = control_info.run_stack;
        match self.side() {
            Side::Outer => match self.node() {
                Some(node) => node
                    .activate(
                        data,
                        ControlInfo {
                            port: Some(self.clone()),
                            run_stack,
                        },
                    )
                    .into_delivery(),
                None => Delivery::Done,
            },
            Side::Inner => {
                let Some(subnet) = self.owning_subnet() else {
                    return Delivery::Done;
                };
                match subnet.ports().get(self.name(), None) {
                    Ok(outer) => outer.output(
                        data,
                        ControlInfo {
                            port: None,
                            run_stack,
                        },
                    ),
                    Err(err) => {
                        self.runtime.logger().error(LogRecord::with_node(
                            err.to_string(),
                            Some(&subnet),
                            Some("Port::input"),
                        ));
                        Delivery::Done
                    }
                }
            }
        }
    }

    /// The subnet shell whose inner side this port belongs to.
    fn owning_subnet(&self) -> Option<Node> {
        let net = self.core().ok()?.subnet_net()?;
        let parent = net.parent.lock();
        match parent.as_ref()? {
            NetParent::Subnet(shell) => {
                let shell = shell.upgrade()?;
                Some(Node::from_shell(self.runtime.clone(), shell))
            }
            NetParent::Remote(_) => None,
        }
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name())
            .field("side", &self.side())
            .field("direction", &self.direction())
            .field("links", &self.link_count())
            .finish()
    }
}
