use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::ControlInfo;
use crate::nodes::Node;

/// The four phases every activation passes through, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkingStage {
    NodeWillRun = 0,
    NodeIsRunning = 1,
    NodeDidRun = 2,
    NodeStopped = 3,
}

impl WorkingStage {
    pub const ALL: [WorkingStage; 4] = [
        WorkingStage::NodeWillRun,
        WorkingStage::NodeIsRunning,
        WorkingStage::NodeDidRun,
        WorkingStage::NodeStopped,
    ];
}

/// A failure captured while a node was activated.
///
/// Built by the activation pipeline when a hook or the node body fails
/// (synchronously or through a failed pending step), then handed to the
/// propagation protocol: `nodeThrowError` handlers, the `$E` port, the parent
/// subnet, and finally the domain.
#[derive(Clone)]
pub struct NodeError {
    pub node: Node,
    pub error: Arc<anyhow::Error>,
    pub stage: WorkingStage,
    pub data: Value,
    pub control_info: ControlInfo,
}

impl NodeError {
    pub fn new(
        node: Node,
        error: anyhow::Error,
        stage: WorkingStage,
        data: Value,
        control_info: ControlInfo,
    ) -> Self {
        Self {
            node,
            error: Arc::new(error),
            stage,
            data,
            control_info,
        }
    }

    /// JSON record emitted as ordinary data on a node's `$E` port.
    pub fn to_value(&self) -> Value {
        let run_stack: Vec<Value> = self
            .control_info
            .run_stack
            .iter()
            .map(|frame| json!({ "nid": frame.nid, "activation": frame.activation.to_string() }))
            .collect();
        json!({
            "nid": self.node.nid(),
            "brand": self.node.brand(),
            "stage": self.stage,
            "error": format!("{:#}", self.error),
            "data": self.data,
            "port": self.control_info.port.as_ref().map(|p| p.name().to_string()),
            "runStack": run_stack,
        })
    }
}

impl fmt::Debug for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeError")
            .field("nid", &self.node.nid())
            .field("brand", &self.node.brand())
            .field("stage", &self.stage)
            .field("error", &self.error)
            .field("data", &self.data)
            .finish()
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node #{} ({}) failed during {:?}: {:#}",
            self.node.nid(),
            self.node.brand(),
            self.stage,
            self.error
        )
    }
}
