//! Span service
//!
//! The facade the transport talks to. One [`SpanService`] owns the whole
//! topology behind a single `parking_lot::Mutex`; every entry point except
//! LNK_PING takes the lock, runs to completion and releases it. The service holds no
//! threads of its own and never blocks on I/O while locked: all outbound
//! effects are non-blocking calls into [`TransportEffects`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = SpanService::new(SpanConfig::default(), transport)?;
//!
//! // From the transport's receive path
//! service.dispatch(&msg)?;
//!
//! // Periodically, or when the owning layer suspects drift
//! let report = service.maintain();
//! ```

use crate::config::SpanConfig;
use crate::handlers;
use crate::state::{Effects, RescanReport, SpanState};
use crate::topology::{ClusterKey, NodeKey, NodeOpaque};
use dmsg_core::{
    Command, DmsgError, LnkConn, LnkSpan, Message, NodeId, NoopObserver, OsRandom, RandomEffects,
    Result, TopologyObserver, TransactionId, TransportEffects,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Inspection types
// =============================================================================

/// Record counts at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyStats {
    /// Cluster records, including pinned empty ones
    pub clusters: usize,
    /// Node records
    pub nodes: usize,
    /// Open received spans
    pub links: usize,
    /// Open connections
    pub connections: usize,
    /// Active relays across all connections
    pub relays: usize,
}

/// One active relay, as seen from its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfo {
    /// Connection carrying the relay
    pub conn: TransactionId,
    /// Node the relayed link belongs to
    pub node: NodeId,
    /// Received span being re-announced
    pub source: TransactionId,
    /// Span transaction opened on the connection
    pub target: TransactionId,
    /// Hop count of the source link (the announcement carries one more)
    pub source_dist: u32,
    /// Sub-sort of the source link
    pub source_rnss: u32,
}

/// One open received span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Received transaction
    pub tx: TransactionId,
    /// Owning node
    pub node: NodeId,
    /// Owning cluster
    pub cluster: ClusterKey,
    /// Node identity inside the cluster
    pub node_key: NodeKey,
    /// Announcement as received
    pub span: LnkSpan,
    /// Relays spawned from the link, oldest first
    pub relays: Vec<TransactionId>,
}

/// Pin on a cluster record.
///
/// While a handle is outstanding the cluster record survives its last node.
/// Hand it back with [`SpanService::release_cluster`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a cluster pin must be released"]
pub struct ClusterHandle {
    key: ClusterKey,
}

impl ClusterHandle {
    /// Pinned cluster identity
    pub fn key(&self) -> &ClusterKey {
        &self.key
    }
}

// =============================================================================
// Service
// =============================================================================

/// LNK_SPAN/LNK_CONN topology aggregation and relay selection.
pub struct SpanService {
    state: Mutex<SpanState>,
    transport: Arc<dyn TransportEffects>,
    random: Arc<dyn RandomEffects>,
    observer: Arc<dyn TopologyObserver>,
}

impl fmt::Debug for SpanService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("SpanService");
        if let Some(state) = self.state.try_lock() {
            out.field("config", &state.config);
        }
        out.finish_non_exhaustive()
    }
}

impl SpanService {
    /// Create a service over `transport`, using OS randomness and no observer
    pub fn new(config: SpanConfig, transport: Arc<dyn TransportEffects>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(SpanState::new(config)),
            transport,
            random: Arc::new(OsRandom),
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replace the random source used for relay sub-sort values
    pub fn with_random(mut self, random: Arc<dyn RandomEffects>) -> Self {
        self.random = random;
        self
    }

    /// Install an observer for connection, node and media events
    pub fn with_observer(mut self, observer: Arc<dyn TopologyObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn effects(&self) -> Effects<'_> {
        Effects {
            transport: self.transport.as_ref(),
            random: self.random.as_ref(),
            observer: self.observer.as_ref(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> SpanConfig {
        self.state.lock().config.clone()
    }

    // -------------------------------------------------------------------------
    // Transport entry points
    // -------------------------------------------------------------------------

    /// Route one received message to the matching handler.
    ///
    /// Commands the subsystem does not own are handed back through
    /// [`TransportEffects::deliver`].
    pub fn dispatch(&self, msg: &Message) -> Result<()> {
        if matches!(msg.command, Command::Ping) {
            return handlers::ping(self.transport.as_ref(), msg);
        }
        self.state.lock().dispatch(self.effects(), msg)
    }

    /// LNK_CONN opened on `tx`
    pub fn handle_conn_open(&self, tx: TransactionId, handshake: LnkConn) -> Result<()> {
        self.state.lock().conn_open(self.effects(), tx, handshake)
    }

    /// LNK_CONN on `tx` closed
    pub fn handle_conn_close(&self, tx: TransactionId) -> Result<()> {
        self.state.lock().conn_close(self.effects(), tx)
    }

    /// LNK_SPAN opened on `tx`
    pub fn handle_span_open(&self, tx: TransactionId, span: LnkSpan) -> Result<()> {
        self.state.lock().span_open(self.effects(), tx, span)
    }

    /// LNK_SPAN on `tx` closed
    pub fn handle_span_close(&self, tx: TransactionId) -> Result<()> {
        self.state.lock().span_close(self.effects(), tx)
    }

    /// LNK_PING request or reply; takes no lock
    pub fn handle_ping(&self, msg: &Message) -> Result<()> {
        handlers::ping(self.transport.as_ref(), msg)
    }

    /// Reply arriving on a span transaction this service opened
    pub fn handle_relay_reply(&self, msg: &Message) -> Result<()> {
        self.state.lock().relay_message(self.effects(), msg)
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Full rescan of every node against every connection
    pub fn maintain(&self) -> RescanReport {
        let report = self.rescan(None, None);
        debug!(
            created = report.created,
            deleted = report.deleted,
            "maintenance rescan"
        );
        report
    }

    /// Reconcile one connection, one node, both, or everything
    pub fn rescan(&self, conn: Option<TransactionId>, node: Option<NodeId>) -> RescanReport {
        self.state.lock().rescan(self.effects(), conn, node)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Current record counts
    pub fn stats(&self) -> TopologyStats {
        let state = self.state.lock();
        TopologyStats {
            clusters: state.topology.cluster_count(),
            nodes: state.topology.node_count(),
            links: state.topology.link_count(),
            connections: state.connections.len(),
            relays: state.relays.len(),
        }
    }

    /// Relays carried by `conn`, in relay index order
    pub fn relays_on(&self, conn: TransactionId) -> Vec<RelayInfo> {
        let state = self.state.lock();
        let Some(connection) = state.connections.get(&conn) else {
            return Vec::new();
        };
        connection
            .relays
            .iter()
            .map(|(key, target)| RelayInfo {
                conn,
                node: key.node,
                source: key.source,
                target: *target,
                source_dist: key.dist,
                source_rnss: key.rnss,
            })
            .collect()
    }

    /// Relay whose outgoing transaction is `target`
    pub fn relay(&self, target: TransactionId) -> Option<RelayInfo> {
        let state = self.state.lock();
        state.relays.get(&target).map(|relay| RelayInfo {
            conn: relay.conn,
            node: relay.key.node,
            source: relay.source,
            target: relay.target,
            source_dist: relay.key.dist,
            source_rnss: relay.key.rnss,
        })
    }

    /// Open link received on `tx`
    pub fn find_link_by_transaction(&self, tx: TransactionId) -> Option<LinkInfo> {
        let state = self.state.lock();
        state.link_info(state.topology.link(&tx)?)
    }

    /// Open link whose opening message id is `msgid`, on any physical link.
    ///
    /// Scans the whole topology; meant for diagnostics.
    pub fn find_link_by_msgid(&self, msgid: u64) -> Option<LinkInfo> {
        let state = self.state.lock();
        state.link_info(state.topology.find_link_by_msgid(msgid)?)
    }

    /// Node a span with this identity belongs to, if it exists
    pub fn find_node(&self, span: &LnkSpan) -> Option<NodeId> {
        self.state
            .lock()
            .topology
            .find_node(&ClusterKey::from_span(span), &NodeKey::from_span(span))
    }

    /// Links of `node`, best first
    pub fn links_of(&self, node: NodeId) -> Vec<TransactionId> {
        self.state
            .lock()
            .topology
            .links_of(node)
            .iter()
            .map(|link| link.tx)
            .collect()
    }

    /// Whether a cluster record exists for `key`
    pub fn has_cluster(&self, key: &ClusterKey) -> bool {
        self.state.lock().topology.has_cluster(key)
    }

    // -------------------------------------------------------------------------
    // Owner hooks
    // -------------------------------------------------------------------------

    /// Pin the cluster named by `key`, creating an empty record if needed
    pub fn acquire_cluster(&self, key: ClusterKey) -> ClusterHandle {
        self.state.lock().topology.acquire_cluster(&key);
        ClusterHandle { key }
    }

    /// Drop a pin. Returns true if that deleted the cluster record.
    pub fn release_cluster(&self, handle: ClusterHandle) -> bool {
        self.state.lock().topology.release_cluster(&handle.key)
    }

    /// Attach owner data to a node; `None` clears it
    pub fn set_node_opaque(&self, node: NodeId, opaque: Option<NodeOpaque>) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .topology
            .node_mut(node)
            .ok_or_else(|| DmsgError::not_found(format!("node {node}")))?;
        record.opaque = opaque;
        Ok(())
    }

    /// Owner data attached to a node
    pub fn node_opaque(&self, node: NodeId) -> Option<NodeOpaque> {
        self.state.lock().topology.node(node)?.opaque.clone()
    }
}

impl SpanState {
    fn link_info(&self, link: &crate::topology::Link) -> Option<LinkInfo> {
        let node = self.topology.node(link.node)?;
        Some(LinkInfo {
            tx: link.tx,
            node: node.id,
            cluster: node.cluster.clone(),
            node_key: node.key.clone(),
            span: link.span.clone(),
            relays: link.relays.iter().copied().collect(),
        })
    }
}
