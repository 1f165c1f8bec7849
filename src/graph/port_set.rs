use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::port::{is_port_name, reserved_direction, Direction, Port, PortInner, Side};
use crate::core::{LogRecord, Runtime};
use crate::error::{EngineError, EngineResult};
use crate::nodes::{NodeCore, ShellInner};

pub(crate) type PortCache = Arc<Mutex<HashMap<String, Arc<PortInner>>>>;

/// Lazily populated ports on one side of a node.
///
/// The outer set belongs to a shell; the inner set belongs to a subnet core
/// and is shared by all of its shells.
#[derive(Clone)]
pub struct PortSet {
    runtime: Runtime,
    side: Side,
    core: Arc<NodeCore>,
    shell: Option<Weak<ShellInner>>,
    cache: PortCache,
}

impl PortSet {
    pub(crate) fn new(
        runtime: Runtime,
        side: Side,
        core: Arc<NodeCore>,
        shell: Option<Weak<ShellInner>>,
        cache: PortCache,
    ) -> Self {
        Self {
            runtime,
            side,
            core,
            shell,
            cache,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Ports created so far, sorted by name.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.lock().contains_key(name)
    }

    /// Get the port called `name`, creating it on first access.
    ///
    /// An explicit direction other than `Unknown` is applied to an existing
    /// port, or decides the direction of a new one. Without one, a new port
    /// takes whatever the core already knows about the name.
    pub fn get(&self, name: &str, direction: Option<Direction>) -> EngineResult<Port> {
        if !is_port_name(name) {
            return Err(EngineError::InvalidPortName(name.to_string()));
        }
        if self.side == Side::Outer && name == "$IE" {
            self.runtime.logger().error(LogRecord::with_node(
                "a node cannot have an outer port named \"$IE\"",
                None,
                Some("PortSet::get"),
            ));
            return Err(EngineError::ReservedPortName(name.to_string()));
        }

        let cached = self.cache.lock().get(name).cloned();
        if let Some(inner) = cached {
            let port = Port::from_inner(self.runtime.clone(), inner);
            if let Some(dir) = direction.filter(|d| *d != Direction::Unknown) {
                port.set_direction(dir)?;
            }
            return Ok(port);
        }

        let core = &self.core;
        let requested = direction.unwrap_or(Direction::Unknown);
        let core_direction = core
            .port_direction(name)
            .filter(|d| *d != Direction::Unknown);
        let resolved = match (reserved_direction(name), core_direction) {
            (Some(reserved), _) => {
                if requested != Direction::Unknown && requested != reserved {
                    return Err(EngineError::PortDirectionConflict {
                        port: name.to_string(),
                        current: reserved,
                        requested,
                    });
                }
                reserved
            }
            (None, Some(known)) => {
                if requested != Direction::Unknown && requested != known {
                    return Err(EngineError::PortDirectionConflict {
                        port: name.to_string(),
                        current: known,
                        requested,
                    });
                }
                known
            }
            (None, None) => requested,
        };

        let inner = Arc::new(PortInner::new(
            name,
            self.side,
            core,
            self.shell.clone(),
            resolved,
        ));
        // Cache before registering so the shell listener finds this port.
        let inner = self
            .cache
            .lock()
            .entry(name.to_string())
            .or_insert(inner)
            .clone();
        core.set_core_ports_state(&self.runtime, name, Some(resolved), None)?;
        Ok(Port::from_inner(self.runtime.clone(), inner))
    }
}

impl std::fmt::Debug for PortSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSet")
            .field("side", &self.side)
            .field("ports", &self.names())
            .finish()
    }
}
