//! Relay selection.
//!
//! For every (node, connection) pair the best links of the node should be
//! relayed out the connection, up to the configured fan-out. [`rescan_one`]
//! walks the node's links and the connection's relays for that node side by
//! side (both are sorted the same way) and opens or closes relays until the
//! two agree.
//!
//! Links are visited best first. The first link that fails a filter ends the
//! walk: every later link is worse, and relays past that point are excess.
//!
//! [`rescan_one`]: SpanState::rescan_one

use crate::connection::RelayKey;
use crate::state::{Effects, RescanReport, SpanState};
use crate::topology::ClusterKey;
use dmsg_core::{LinkId, LnkConn, LnkSpan, NodeId, TransactionId};
use std::fmt;
use tracing::{debug, trace};

/// Why a link may not be relayed out a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Hop count is past the loop ceiling
    TooFar,
    /// The span arrived over the connection's own physical link
    Loopback,
    /// Connection does not accept the span's peer type
    PeerTypeMasked,
    /// Connection does not accept the span's pfs type
    PfsTypeMasked,
    /// Clients are never shown other clients
    ClientToClient,
    /// Connection filters on a different cluster id
    ClusterIdMismatch,
    /// Connection filters on a different cluster label
    ClusterLabelMismatch,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::TooFar => "dist exceeds maximum",
            Self::Loopback => "same physical link",
            Self::PeerTypeMasked => "peer type not accepted",
            Self::PfsTypeMasked => "pfs type not accepted",
            Self::ClientToClient => "client to client",
            Self::ClusterIdMismatch => "cluster id filtered",
            Self::ClusterLabelMismatch => "cluster label filtered",
        };
        f.write_str(reason)
    }
}

/// Apply the connection filters in their fixed order.
pub fn admit(
    max_dist: u32,
    conn_link: LinkId,
    conn: &LnkConn,
    span_link: LinkId,
    span: &LnkSpan,
    cluster: &ClusterKey,
) -> Result<(), Rejection> {
    if span.dist > max_dist {
        return Err(Rejection::TooFar);
    }
    if span_link == conn_link {
        return Err(Rejection::Loopback);
    }
    if span.peer_type.mask_bit() & conn.peer_mask == 0 {
        return Err(Rejection::PeerTypeMasked);
    }
    if span.pfs_type.mask_bit() & conn.pfs_mask == 0 {
        return Err(Rejection::PfsTypeMasked);
    }
    if conn.pfs_type.is_client() && span.pfs_type.is_client() {
        return Err(Rejection::ClientToClient);
    }
    if !conn.peer_id.is_nil() && conn.peer_id != cluster.peer_id {
        return Err(Rejection::ClusterIdMismatch);
    }
    if !conn.peer_label.is_empty() && conn.peer_label != cluster.peer_label {
        return Err(Rejection::ClusterLabelMismatch);
    }
    Ok(())
}

impl SpanState {
    /// Reconcile relays.
    ///
    /// With a node, only that node is reconciled; otherwise every node in
    /// cluster order. With a connection, only that connection; otherwise
    /// every connection in open order.
    pub(crate) fn rescan(
        &mut self,
        fx: Effects<'_>,
        conn: Option<TransactionId>,
        node: Option<NodeId>,
    ) -> RescanReport {
        let conns = match conn {
            Some(conn) => vec![conn],
            None => self.connections.ids(),
        };
        let nodes = match node {
            Some(node) => vec![node],
            None => self.topology.node_ids(),
        };

        let mut report = RescanReport::default();
        for node in &nodes {
            for conn in &conns {
                report.merge(self.rescan_one(fx, *node, *conn));
            }
        }
        if !report.is_empty() {
            debug!(
                nodes = nodes.len(),
                conns = conns.len(),
                created = report.created,
                deleted = report.deleted,
                "rescan"
            );
        }
        report
    }

    /// Bring `conn`'s relays for `node` in line with the node's best links.
    pub(crate) fn rescan_one(
        &mut self,
        fx: Effects<'_>,
        node: NodeId,
        conn: TransactionId,
    ) -> RescanReport {
        let mut report = RescanReport::default();
        let Some(connection) = self.connections.get(&conn) else {
            return report;
        };
        let Some(cluster) = self.topology.node(node).map(|n| n.cluster.clone()) else {
            return report;
        };
        let conn_link = connection.link();
        let handshake = connection.handshake.clone();
        let mut cursor = connection.first_relay_for(node);

        let candidates: Vec<(TransactionId, u32, u32)> = self
            .topology
            .links_of(node)
            .iter()
            .map(|link| (link.tx, link.span.dist, link.span.rnss))
            .collect();

        let fanout = self.config.fanout;
        let mut accepted = 0usize;
        let mut last_accepted: Option<(u32, u32)> = None;

        for (link, dist, rnss) in candidates {
            if accepted >= fanout {
                let ties = last_accepted == Some((dist, rnss));
                if !(self.config.require_symmetric && ties) {
                    break;
                }
            }

            if cursor.map(|relay| relay.source) == Some(link) {
                cursor = cursor.and_then(|relay| self.next_relay(conn, &relay));
                accepted += 1;
                last_accepted = Some((dist, rnss));
                continue;
            }

            let verdict = match self.topology.link(&link) {
                Some(l) => admit(
                    self.config.max_dist,
                    conn_link,
                    &handshake,
                    l.tx.link,
                    &l.span,
                    &cluster,
                ),
                None => break,
            };
            if let Err(reason) = verdict {
                trace!(%conn, %link, %node, %reason, "link not relayed");
                break;
            }

            debug_assert!(
                cursor.map_or(true, |relay| relay.node != node || relay.dist >= dist),
                "existing relay better than unrelayed link"
            );
            let Some(created) = self.create_relay(fx, conn, link) else {
                break;
            };
            report.created += 1;
            accepted += 1;
            last_accepted = Some((dist, rnss));
            cursor = self.next_relay(conn, &created);
        }

        // Whatever is left for this node is in excess of the converged set.
        if let Some(first_excess) = cursor {
            let excess = self
                .connections
                .get(&conn)
                .map(|c| c.relays_from(&first_excess))
                .unwrap_or_default();
            for target in excess {
                if self.delete_relay(fx, target) {
                    report.deleted += 1;
                }
            }
        }
        report
    }

    fn next_relay(&self, conn: TransactionId, after: &RelayKey) -> Option<RelayKey> {
        self.connections.get(&conn)?.next_relay_after(after)
    }
}
