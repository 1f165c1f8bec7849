use anyhow::anyhow;
use serde_json::Value;

use super::shell::Node;
use crate::core::ActivationId;
use crate::engine::{ControlInfo, Step};
use crate::error::EngineResult;
use crate::graph::Direction;

/// The port that triggered an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: Option<String>,
}

impl Entry {
    pub(crate) fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is(&self, port: &str) -> bool {
        self.name.as_deref() == Some(port)
    }
}

/// What a node body sees while it runs.
///
/// A clone can be moved into an async body and keep emitting after the body
/// first yields. Downstream activations that do not finish in place run
/// detached on the runtime; the emitting activation does not wait for them.
#[derive(Clone)]
pub struct RunConsole {
    node: Node,
    entry: Entry,
    control_info: ControlInfo,
    activation: ActivationId,
}

impl RunConsole {
    pub(crate) fn new(
        node: Node,
        entry: Entry,
        control_info: ControlInfo,
        activation: ActivationId,
    ) -> Self {
        Self {
            node,
            entry,
            control_info,
            activation,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Control info attached to everything emitted from this activation.
    pub fn control_info(&self) -> &ControlInfo {
        &self.control_info
    }

    pub fn activation_id(&self) -> &ActivationId {
        &self.activation
    }

    pub fn state(&self) -> Value {
        self.node.state()
    }

    pub fn set_state(&self, state: Value) {
        self.node.set_state(state);
    }

    pub fn update_state<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        self.node.update_state(f)
    }

    /// Send `data` out through the output port `port`, declaring it as an
    /// output if its direction is not known yet.
    pub fn emit(&self, port: &str, data: Value) -> EngineResult<()> {
        let port = self.node.ports().get(port, Some(Direction::Out))?;
        self.node
            .runtime()
            .detach(port.output(data, self.control_info.clone()));
        Ok(())
    }

    /// Names of this node's output ports.
    pub fn outputs(&self) -> Vec<String> {
        self.node
            .ports_state()
            .into_iter()
            .filter(|(_, state)| state.direction == Direction::Out)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn has_output(&self, port: &str) -> bool {
        self.node
            .port_state(port)
            .is_some_and(|state| state.direction == Direction::Out)
    }

    /// Subnet body: pass the entry data to the inner port with the entry's
    /// name, which hands it to the children linked there.
    pub fn run_net(&self, data: &Value) -> anyhow::Result<Step> {
        let name = self
            .entry
            .name()
            .ok_or_else(|| anyhow!("run_net needs an entry port"))?;
        let port = self.node.inner_ports()?.get(name, None)?;
        self.node
            .runtime()
            .detach(port.output(data.clone(), self.control_info.clone()));
        Ok(Step::Done)
    }
}

impl std::fmt::Debug for RunConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConsole")
            .field("node", &self.node.nid())
            .field("entry", &self.entry)
            .field("activation", &self.activation)
            .finish()
    }
}
