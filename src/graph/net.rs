use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::{Group, RemoteDomain, RemoteNode, Runtime};
use crate::nodes::{Node, NodeCore, ShellInner};

/// Who owns the links inside a net.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOwnership {
    Group(Group),
    RemoteDomain(RemoteDomain),
}

pub(crate) enum NetParent {
    Subnet(Weak<ShellInner>),
    Remote(RemoteNode),
}

/// Members are held weakly. A nested net's subnet core keeps its children
/// alive through `owner`.
#[derive(Default)]
pub(crate) struct NetData {
    pub(crate) parent: Mutex<Option<NetParent>>,
    pub(crate) nodes: Mutex<Vec<Weak<ShellInner>>>,
    pub(crate) owner: Mutex<Weak<NodeCore>>,
    pub(crate) link_ownership: Mutex<Option<LinkOwnership>>,
}

impl NetData {
    fn owner(&self) -> Option<Arc<NodeCore>> {
        self.owner.lock().upgrade()
    }

    pub(crate) fn join(&self, shell: &Arc<ShellInner>) {
        {
            let mut nodes = self.nodes.lock();
            nodes.retain(|n| n.strong_count() > 0);
            nodes.push(Arc::downgrade(shell));
        }
        if let Some(owner) = self.owner() {
            owner.adopt(shell);
        }
    }

    pub(crate) fn leave(&self, shell: &Arc<ShellInner>) {
        self.nodes
            .lock()
            .retain(|n| n.strong_count() > 0 && !std::ptr::eq(n.as_ptr(), Arc::as_ptr(shell)));
        if let Some(owner) = self.owner() {
            owner.release(shell);
        }
    }

    /// Drop entries of shells that no longer exist.
    pub(crate) fn prune(&self) {
        self.nodes.lock().retain(|n| n.strong_count() > 0);
    }
}

/// Parent of a net, as seen from the nodes inside it.
#[derive(Debug, Clone)]
pub enum ParentRef {
    Subnet(Node),
    Remote(RemoteNode),
}

/// One level of graph nesting: member nodes plus an optional parent.
///
/// A root net lives as long as a handle or a member refers to it; a subnet's
/// nested net lives as long as the subnet core.
#[derive(Clone)]
pub struct Net {
    runtime: Runtime,
    data: Arc<NetData>,
}

impl Net {
    pub(crate) fn from_data(runtime: Runtime, data: Arc<NetData>) -> Self {
        Self { runtime, data }
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.data
            .nodes
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|shell| Node::from_shell(self.runtime.clone(), shell))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data
            .nodes
            .lock()
            .iter()
            .filter(|n| n.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node: &Node) -> bool {
        let shell = Arc::as_ptr(node.shell());
        self.data
            .nodes
            .lock()
            .iter()
            .any(|n| std::ptr::eq(n.as_ptr(), shell))
    }

    pub fn parent(&self) -> Option<ParentRef> {
        let parent = self.data.parent.lock();
        match parent.as_ref()? {
            NetParent::Subnet(shell) => shell
                .upgrade()
                .map(|shell| ParentRef::Subnet(Node::from_shell(self.runtime.clone(), shell))),
            NetParent::Remote(remote) => Some(ParentRef::Remote(remote.clone())),
        }
    }

    /// Mark this net as the inside of a node in another domain.
    pub fn set_remote_parent(&self, parent: RemoteNode) {
        *self.data.parent.lock() = Some(NetParent::Remote(parent));
    }

    pub fn link_ownership(&self) -> Option<LinkOwnership> {
        self.data.link_ownership.lock().clone()
    }

    pub fn set_link_ownership(&self, ownership: Option<LinkOwnership>) {
        *self.data.link_ownership.lock() = ownership;
    }

    /// Move `node` into this net, leaving its previous one.
    pub fn add(&self, node: &Node) {
        let shell = node.shell();
        let previous = {
            let mut net = shell.net.lock();
            if net.as_ref().is_some_and(|current| Arc::ptr_eq(current, &self.data)) {
                return;
            }
            net.replace(self.data.clone())
        };
        if let Some(previous) = previous {
            previous.leave(shell);
        }
        self.data.join(shell);
    }

    /// Take `node` out of this net. It is left without a net until it asks
    /// for one, which gives it a new root net.
    pub fn remove(&self, node: &Node) -> bool {
        if !self.contains(node) {
            return false;
        }
        let shell = node.shell();
        shell.net.lock().take();
        self.data.leave(shell);
        true
    }
}

impl PartialEq for Net {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl std::fmt::Debug for Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Net").field("nodes", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Step;
    use serde_json::json;

    fn noop(runtime: &Runtime) -> Node {
        Node::new(runtime, json!(null), |_, _| Ok(Step::Done)).unwrap()
    }

    #[test]
    fn test_new_node_lives_in_its_own_root_net() {
        let runtime = Runtime::new();
        let node = noop(&runtime);
        let net = node.net();
        assert_eq!(net.nodes(), vec![node.clone()]);
        assert!(net.parent().is_none());
        assert!(node.parent().is_none());
    }

    #[test]
    fn test_add_moves_membership() {
        let runtime = Runtime::new();
        let a = noop(&runtime);
        let b = noop(&runtime);
        let old = b.net();

        let shared = a.net();
        shared.add(&b);
        assert_eq!(shared.len(), 2);
        assert!(old.is_empty());
        assert_eq!(b.net(), shared);

        // Adding again is a no-op.
        shared.add(&b);
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn test_remove_detaches_into_new_root() {
        let runtime = Runtime::new();
        let a = noop(&runtime);
        let b = noop(&runtime);
        let shared = a.net();
        shared.add(&b);

        assert!(shared.remove(&b));
        assert!(!shared.contains(&b));
        assert_ne!(b.net(), shared);
        assert!(b.net().contains(&b));
        assert!(!shared.remove(&b));
    }

    #[test]
    fn test_dropped_member_leaves_the_net() {
        let runtime = Runtime::new();
        let a = noop(&runtime);
        let net = a.net();
        for _ in 0..10 {
            let b = noop(&runtime);
            net.add(&b);
            assert_eq!(net.len(), 2);
        }
        assert_eq!(net.len(), 1);
        assert_eq!(net.data.nodes.lock().len(), 1);
        assert_eq!(runtime.core_count(), 1);
    }

    #[test]
    fn test_remote_parent_and_link_ownership() {
        let runtime = Runtime::new();
        let net = runtime.create_net();
        let remote = RemoteNode {
            domain: RemoteDomain::new("peer", "run"),
            nid: 4,
        };
        net.set_remote_parent(remote.clone());
        assert!(matches!(net.parent(), Some(ParentRef::Remote(r)) if r == remote));

        let group = runtime.create_group().unwrap();
        net.set_link_ownership(Some(LinkOwnership::Group(group.clone())));
        assert_eq!(net.link_ownership(), Some(LinkOwnership::Group(group)));
        net.set_link_ownership(None);
        assert!(net.link_ownership().is_none());
    }
}
