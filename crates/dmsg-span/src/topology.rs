//! Topology store: clusters, nodes and received links.
//!
//! Every LNK_SPAN we receive is organized by cluster (peer type, peer id and
//! label), then by node (pfs label and pfs id), then by link (the received
//! transaction). A node's links are ordered by [`LinkKey`]; the first
//! entries are the best routes to that node.
//!
//! Records own their children through ordered indexes. Links themselves
//! live in a table keyed by their transaction so that a close can find them
//! directly.

use dmsg_core::{Label, LnkSpan, NodeId, PeerType, PfsType, TransactionId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque per-node slot reserved for the owning layer
pub type NodeOpaque = Arc<dyn Any + Send + Sync>;

/// Cluster identity. Peer type, id and label must all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    /// Kind of peer
    pub peer_type: PeerType,
    /// Shared cluster id
    pub peer_id: Uuid,
    /// Cluster label
    pub peer_label: Label,
}

impl ClusterKey {
    /// Cluster identity named by a span
    pub fn from_span(span: &LnkSpan) -> Self {
        Self {
            peer_type: span.peer_type,
            peer_id: span.peer_id,
            peer_label: span.peer_label.clone(),
        }
    }
}

/// Node identity within a cluster. Sorts by label, then id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    /// Filesystem instance label
    pub pfs_label: Label,
    /// Unique filesystem instance id
    pub pfs_id: Uuid,
}

impl NodeKey {
    /// Node identity named by a span
    pub fn from_span(span: &LnkSpan) -> Self {
        Self {
            pfs_label: span.pfs_label.clone(),
            pfs_id: span.pfs_id,
        }
    }
}

/// Ordering of a node's links: best (lowest) first.
///
/// The transaction id breaks ties so the order is total and stable. Relay
/// keys sort identically under each node, see
/// [`RelayKey`](crate::connection::RelayKey).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    /// Hop count
    pub dist: u32,
    /// Random sub-sort
    pub rnss: u32,
    /// Received transaction
    pub tx: TransactionId,
}

#[derive(Debug)]
pub(crate) struct Cluster {
    pub(crate) nodes: BTreeMap<NodeKey, NodeId>,
    /// Outstanding handles; keeps an empty cluster alive
    pub(crate) refs: u32,
}

impl Cluster {
    fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            refs: 0,
        }
    }

    fn is_unused(&self) -> bool {
        self.nodes.is_empty() && self.refs == 0
    }
}

pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) cluster: ClusterKey,
    pub(crate) key: NodeKey,
    pub(crate) pfs_type: PfsType,
    /// Span that created the node, reported to the observer
    pub(crate) origin: LnkSpan,
    pub(crate) links: BTreeSet<LinkKey>,
    pub(crate) opaque: Option<NodeOpaque>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("cluster", &self.cluster)
            .field("key", &self.key)
            .field("pfs_type", &self.pfs_type)
            .field("links", &self.links.len())
            .field("opaque", &self.opaque.is_some())
            .finish()
    }
}

/// One currently-open received LNK_SPAN.
#[derive(Debug)]
pub(crate) struct Link {
    pub(crate) tx: TransactionId,
    pub(crate) node: NodeId,
    pub(crate) span: LnkSpan,
    /// Relays spawned from this link, by target transaction, oldest first
    pub(crate) relays: VecDeque<TransactionId>,
}

impl Link {
    pub(crate) fn key(&self) -> LinkKey {
        LinkKey {
            dist: self.span.dist,
            rnss: self.span.rnss,
            tx: self.tx,
        }
    }
}

/// What [`Topology::remove_link`] tore down.
#[derive(Debug)]
pub(crate) struct LinkRemoval {
    pub(crate) link: Link,
    /// Set when the link was the node's last
    pub(crate) node: Option<Node>,
    /// Set when the node was the cluster's last and nothing pinned it
    pub(crate) cluster_removed: bool,
}

/// Cluster → node → link index
#[derive(Debug, Default)]
pub(crate) struct Topology {
    clusters: BTreeMap<ClusterKey, Cluster>,
    nodes: HashMap<NodeId, Node>,
    links: HashMap<TransactionId, Link>,
    next_node: u64,
}

impl Topology {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn find_or_create_cluster(&mut self, key: &ClusterKey) -> &mut Cluster {
        self.clusters.entry(key.clone()).or_insert_with(Cluster::new)
    }

    /// Returns the node handle and whether the node was created.
    pub(crate) fn find_or_create_node(
        &mut self,
        cluster: &ClusterKey,
        span: &LnkSpan,
    ) -> (NodeId, bool) {
        let key = NodeKey::from_span(span);
        let cls = self
            .clusters
            .entry(cluster.clone())
            .or_insert_with(Cluster::new);
        if let Some(id) = cls.nodes.get(&key) {
            return (*id, false);
        }

        self.next_node += 1;
        let id = NodeId(self.next_node);
        cls.nodes.insert(key.clone(), id);
        self.nodes.insert(
            id,
            Node {
                id,
                cluster: cluster.clone(),
                key,
                pfs_type: span.pfs_type,
                origin: span.clone(),
                links: BTreeSet::new(),
                opaque: None,
            },
        );
        (id, true)
    }

    pub(crate) fn insert_link(&mut self, node: NodeId, tx: TransactionId, span: LnkSpan) -> LinkKey {
        let link = Link {
            tx,
            node,
            span,
            relays: VecDeque::new(),
        };
        let key = link.key();
        if let Some(owner) = self.nodes.get_mut(&node) {
            owner.links.insert(key);
        }
        debug_assert!(!self.links.contains_key(&tx), "link {tx} inserted twice");
        self.links.insert(tx, link);
        key
    }

    /// Remove a link, cascading to its node and cluster when they empty.
    ///
    /// The link's relays must already be gone.
    pub(crate) fn remove_link(&mut self, tx: TransactionId) -> Option<LinkRemoval> {
        let link = self.links.remove(&tx)?;
        debug_assert!(link.relays.is_empty(), "link {tx} removed with live relays");

        let mut removal = LinkRemoval {
            link,
            node: None,
            cluster_removed: false,
        };

        let node_empty = match self.nodes.get_mut(&removal.link.node) {
            Some(node) => {
                node.links.remove(&removal.link.key());
                node.links.is_empty()
            }
            None => false,
        };
        if !node_empty {
            return Some(removal);
        }

        if let Some(node) = self.nodes.remove(&removal.link.node) {
            if let Some(cls) = self.clusters.get_mut(&node.cluster) {
                cls.nodes.remove(&node.key);
                if cls.is_unused() {
                    self.clusters.remove(&node.cluster);
                    removal.cluster_removed = true;
                }
            }
            removal.node = Some(node);
        }
        Some(removal)
    }

    pub(crate) fn link(&self, tx: &TransactionId) -> Option<&Link> {
        self.links.get(tx)
    }

    pub(crate) fn link_mut(&mut self, tx: &TransactionId) -> Option<&mut Link> {
        self.links.get_mut(tx)
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn find_node(&self, cluster: &ClusterKey, key: &NodeKey) -> Option<NodeId> {
        self.clusters.get(cluster)?.nodes.get(key).copied()
    }

    /// Links of a node, best first
    pub(crate) fn links_of(&self, node: NodeId) -> Vec<&Link> {
        self.nodes
            .get(&node)
            .map(|n| {
                n.links
                    .iter()
                    .filter_map(|key| self.links.get(&key.tx))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every node, in cluster order then node order
    pub(crate) fn node_ids(&self) -> Vec<NodeId> {
        self.clusters
            .values()
            .flat_map(|cls| cls.nodes.values().copied())
            .collect()
    }

    /// Walk clusters, nodes and links looking for a received message id.
    ///
    /// Linear; for diagnostics only.
    pub(crate) fn find_link_by_msgid(&self, msgid: u64) -> Option<&Link> {
        self.clusters
            .values()
            .flat_map(|cls| cls.nodes.values())
            .filter_map(|id| self.nodes.get(id))
            .flat_map(|node| node.links.iter())
            .find(|key| key.tx.msgid == msgid)
            .and_then(|key| self.links.get(&key.tx))
    }

    /// Pin a cluster, creating it if absent
    pub(crate) fn acquire_cluster(&mut self, key: &ClusterKey) {
        self.find_or_create_cluster(key).refs += 1;
    }

    /// Drop a pin. Returns true when the cluster record was deleted.
    pub(crate) fn release_cluster(&mut self, key: &ClusterKey) -> bool {
        let Some(cls) = self.clusters.get_mut(key) else {
            return false;
        };
        debug_assert!(cls.refs > 0, "cluster released more often than acquired");
        cls.refs = cls.refs.saturating_sub(1);
        if cls.is_unused() {
            self.clusters.remove(key);
            return true;
        }
        false
    }

    pub(crate) fn has_cluster(&self, key: &ClusterKey) -> bool {
        self.clusters.contains_key(key)
    }

    pub(crate) fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn link_count(&self) -> usize {
        self.links.len()
    }
}
