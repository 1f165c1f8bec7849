use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::activation_id::ActivationId;
use super::cuuid::cuuid;
use crate::error::{EngineError, EngineResult};

/// Identity of a process among interconnected peers.
///
/// `run_id` is regenerated on every start, so a peer that restarts is
/// distinguishable from its previous run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub run_id: String,
    pub is_local: bool,
}

/// A peer domain as reported by an external networking layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteDomain(Domain);

impl RemoteDomain {
    pub fn new(id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self(Domain {
            id: id.into(),
            run_id: run_id.into(),
            is_local: false,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.0
    }
}

/// Link-ownership scope inside the local domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub domain: Domain,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteGroup {
    pub domain: RemoteDomain,
    pub gid: u32,
}

/// Opaque reference to a node living in another domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteNode {
    pub domain: RemoteDomain,
    pub nid: u32,
}

/// Known peers split into online and offline.
///
/// Every member of `online` or `offline` is also in `all`, and no peer is in
/// both.
#[derive(Debug, Clone)]
pub struct PeerSet<T> {
    all: HashSet<T>,
    online: HashSet<T>,
    offline: HashSet<T>,
}

impl<T> Default for PeerSet<T> {
    fn default() -> Self {
        Self {
            all: HashSet::new(),
            online: HashSet::new(),
            offline: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> PeerSet<T> {
    pub fn insert(&mut self, peer: T, online: bool) {
        self.all.insert(peer.clone());
        if online {
            self.offline.remove(&peer);
            self.online.insert(peer);
        } else {
            self.online.remove(&peer);
            self.offline.insert(peer);
        }
    }

    /// Returns `false` for a peer that was never inserted.
    pub fn set_online(&mut self, peer: &T) -> bool {
        if !self.all.contains(peer) {
            return false;
        }
        self.offline.remove(peer);
        self.online.insert(peer.clone());
        true
    }

    pub fn set_offline(&mut self, peer: &T) -> bool {
        if !self.all.contains(peer) {
            return false;
        }
        self.online.remove(peer);
        self.offline.insert(peer.clone());
        true
    }

    pub fn remove(&mut self, peer: &T) -> bool {
        self.online.remove(peer);
        self.offline.remove(peer);
        self.all.remove(peer)
    }

    pub fn contains(&self, peer: &T) -> bool {
        self.all.contains(peer)
    }

    pub fn is_online(&self, peer: &T) -> bool {
        self.online.contains(peer)
    }

    pub fn all(&self) -> &HashSet<T> {
        &self.all
    }

    pub fn online(&self) -> &HashSet<T> {
        &self.online
    }

    pub fn offline(&self) -> &HashSet<T> {
        &self.offline
    }
}

#[derive(Debug, Default)]
struct Counters {
    node_nid: u32,
    group_gid: u32,
    activation: ActivationId,
}

/// The process-local domain: identity, id counters and peer bookkeeping.
#[derive(Debug)]
pub struct LocalDomain {
    identity: Domain,
    counters: Mutex<Counters>,
    remote_domains: Mutex<PeerSet<RemoteDomain>>,
    remote_groups: Mutex<PeerSet<RemoteGroup>>,
    local_groups: Mutex<HashSet<Group>>,
}

impl LocalDomain {
    pub fn new(id: Option<String>) -> Self {
        Self {
            identity: Domain {
                id: id.unwrap_or_else(|| cuuid(8)),
                run_id: cuuid(24),
                is_local: true,
            },
            counters: Mutex::new(Counters::default()),
            remote_domains: Mutex::new(PeerSet::default()),
            remote_groups: Mutex::new(PeerSet::default()),
            local_groups: Mutex::new(HashSet::new()),
        }
    }

    pub fn identity(&self) -> &Domain {
        &self.identity
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn run_id(&self) -> &str {
        &self.identity.run_id
    }

    /// Fails once every `u32` node id has been handed out.
    pub fn allocate_node_id(&self) -> EngineResult<u32> {
        let mut counters = self.counters.lock();
        let nid = counters.node_nid;
        counters.node_nid = nid
            .checked_add(1)
            .ok_or_else(|| EngineError::IdSpaceExhausted("node".into()))?;
        Ok(nid)
    }

    pub fn allocate_group_id(&self) -> EngineResult<u32> {
        let mut counters = self.counters.lock();
        let gid = counters.group_gid;
        counters.group_gid = gid
            .checked_add(1)
            .ok_or_else(|| EngineError::IdSpaceExhausted("group".into()))?;
        Ok(gid)
    }

    pub fn allocate_activation_id(&self) -> ActivationId {
        let mut counters = self.counters.lock();
        let id = counters.activation.clone();
        counters.activation.add_one();
        id
    }

    /// Allocate a gid and record the group as local.
    pub fn create_group(&self) -> EngineResult<Group> {
        let group = Group {
            domain: self.identity.clone(),
            gid: self.allocate_group_id()?,
        };
        self.local_groups.lock().insert(group.clone());
        Ok(group)
    }

    pub fn local_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.local_groups.lock().iter().cloned().collect();
        groups.sort_by_key(|g| g.gid);
        groups
    }

    pub fn remote_domains(&self) -> parking_lot::MutexGuard<'_, PeerSet<RemoteDomain>> {
        self.remote_domains.lock()
    }

    pub fn remote_groups(&self) -> parking_lot::MutexGuard<'_, PeerSet<RemoteGroup>> {
        self.remote_groups.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_monotonic() {
        let domain = LocalDomain::new(None);
        assert_eq!(domain.allocate_node_id().unwrap(), 0);
        assert_eq!(domain.allocate_node_id().unwrap(), 1);
        assert_eq!(domain.allocate_group_id().unwrap(), 0);

        let first = domain.allocate_activation_id();
        let second = domain.allocate_activation_id();
        assert_eq!(first.to_string(), "0");
        assert!(second > first);
    }

    #[test]
    fn test_exhausted_counters_report_an_error() {
        let domain = LocalDomain::new(None);
        domain.counters.lock().node_nid = u32::MAX - 1;
        assert_eq!(domain.allocate_node_id().unwrap(), u32::MAX - 1);
        assert_eq!(
            domain.allocate_node_id(),
            Err(EngineError::IdSpaceExhausted("node".into()))
        );
        assert_eq!(domain.counters.lock().node_nid, u32::MAX);

        domain.counters.lock().group_gid = u32::MAX;
        assert!(matches!(
            domain.create_group(),
            Err(EngineError::IdSpaceExhausted(kind)) if kind == "group"
        ));
        assert!(domain.local_groups().is_empty());
    }

    #[test]
    fn test_identity() {
        let domain = LocalDomain::new(Some("edge-1".into()));
        assert_eq!(domain.id(), "edge-1");
        assert_eq!(domain.run_id().len(), 32);
        assert!(domain.identity().is_local);

        let other = LocalDomain::new(None);
        assert_eq!(other.id().len(), 16);
        assert_ne!(other.run_id(), domain.run_id());
    }

    #[test]
    fn test_create_group_records_local_group() {
        let domain = LocalDomain::new(None);
        let g0 = domain.create_group().unwrap();
        let g1 = domain.create_group().unwrap();
        assert_eq!(g0.gid, 0);
        assert_eq!(g1.gid, 1);
        assert_eq!(g0.domain, *domain.identity());
        assert_eq!(domain.local_groups(), vec![g0, g1]);
    }

    #[test]
    fn test_peer_set_online_offline() {
        let mut peers = PeerSet::default();
        let a = RemoteDomain::new("a", "run-a");
        let b = RemoteDomain::new("b", "run-b");
        assert!(!a.domain().is_local);

        peers.insert(a.clone(), true);
        peers.insert(b.clone(), false);
        assert!(peers.is_online(&a));
        assert!(!peers.is_online(&b));
        assert_eq!(peers.all().len(), 2);

        assert!(peers.set_offline(&a));
        assert!(peers.set_online(&b));
        assert_eq!(peers.online().len(), 1);
        assert!(peers.offline().contains(&a));

        assert!(peers.remove(&a));
        assert!(!peers.contains(&a));
        assert!(peers.offline().is_empty());
        assert!(!peers.set_online(&a));
    }

    #[test]
    fn test_remote_group_bookkeeping() {
        let domain = LocalDomain::new(None);
        let remote = RemoteDomain::new("peer", "run");
        let group = RemoteGroup {
            domain: remote.clone(),
            gid: 7,
        };
        domain.remote_domains().insert(remote.clone(), true);
        domain.remote_groups().insert(group.clone(), true);
        domain.remote_groups().set_offline(&group);
        assert!(domain.remote_domains().is_online(&remote));
        assert!(!domain.remote_groups().is_online(&group));
    }
}
