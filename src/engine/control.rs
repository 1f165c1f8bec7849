use std::fmt;
use std::sync::Arc;

use crate::core::ActivationId;
use crate::graph::Port;

/// One entry of a run stack: which node emitted, during which activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFrame {
    pub nid: u32,
    pub activation: ActivationId,
}

struct StackNode {
    frame: RunFrame,
    below: Option<Arc<StackNode>>,
}

/// Persistent stack of emitting activations, innermost first.
///
/// Pushing shares the tail with the stack it extends, so every downstream activation
/// can keep its own stack without copying.
#[derive(Clone, Default)]
pub struct RunStack {
    top: Option<Arc<StackNode>>,
    depth: usize,
}

impl RunStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, nid: u32, activation: ActivationId) -> Self {
        Self {
            top: Some(Arc::new(StackNode {
                frame: RunFrame { nid, activation },
                below: self.top.clone(),
            })),
            depth: self.depth + 1,
        }
    }

    pub fn top(&self) -> Option<&RunFrame> {
        self.top.as_deref().map(|n| &n.frame)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    pub fn iter(&self) -> RunStackIter<'_> {
        RunStackIter {
            next: self.top.as_deref(),
        }
    }
}

impl fmt::Debug for RunStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct RunStackIter<'a> {
    next: Option<&'a StackNode>,
}

impl<'a> Iterator for RunStackIter<'a> {
    type Item = &'a RunFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.below.as_deref();
        Some(&node.frame)
    }
}

/// Routing information travelling with data: the port it arrived on and the
/// chain of activations that produced it.
#[derive(Clone, Default)]
pub struct ControlInfo {
    pub port: Option<Port>,
    pub run_stack: RunStack,
}

impl ControlInfo {
    pub fn with_port(port: Port) -> Self {
        Self {
            port: Some(port),
            run_stack: RunStack::new(),
        }
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port.as_ref().map(|p| p.name())
    }
}

impl fmt::Debug for ControlInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlInfo")
            .field("port", &self.port_name())
            .field("run_stack", &self.run_stack)
            .finish()
    }
}
