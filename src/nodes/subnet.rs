use std::sync::Arc;

use super::core::{CoreId, NodeCore};
use super::shell::Node;
use crate::core::Runtime;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Direction, Net, NetData, Port, PortSet, Side};

/// Handed to a subnet's `define` step to build the nested graph.
pub struct SubnetScope {
    runtime: Runtime,
    core: Arc<NodeCore>,
    net: Arc<NetData>,
}

impl SubnetScope {
    pub(crate) fn new(runtime: Runtime, core: Arc<NodeCore>, net: Arc<NetData>) -> Self {
        Self { runtime, core, net }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn core_id(&self) -> CoreId {
        self.core.id()
    }

    pub fn net(&self) -> Net {
        Net::from_data(self.runtime.clone(), self.net.clone())
    }

    pub fn inner_ports(&self) -> EngineResult<PortSet> {
        let cache = self
            .core
            .inner_port_cache()
            .ok_or(EngineError::UnknownCore(self.core.id()))?;
        Ok(PortSet::new(
            self.runtime.clone(),
            Side::Inner,
            self.core.clone(),
            None,
            cache,
        ))
    }

    pub fn inner_port(&self, name: &str, direction: Option<Direction>) -> EngineResult<Port> {
        self.inner_ports()?.get(name, direction)
    }

    /// Make `node` a child of this subnet.
    pub fn add_child(&self, node: &Node) {
        self.net().add(node);
    }

    pub fn children(&self) -> Vec<Node> {
        self.net().nodes()
    }
}
