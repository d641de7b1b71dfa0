//! Relay lifecycle.
//!
//! A relay records that a received link is being re-announced out one
//! connection through a LNK_SPAN transaction we opened ourselves. It holds a
//! reference on both transactions and sits in two indexes: its connection's
//! relay index and its source link's relay queue.
//!
//! Relays are keyed by their outgoing transaction. Deletion removes the
//! table entry first, so whichever of link teardown, connection teardown,
//! rescan or a remote close gets there first does the work and every later
//! attempt finds nothing.

use crate::connection::RelayKey;
use crate::state::{Effects, SpanState};
use dmsg_core::{RefTag, TransactionId};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct Relay {
    /// Connection carrying the relay
    pub(crate) conn: TransactionId,
    /// Received LNK_SPAN being re-announced
    pub(crate) source: TransactionId,
    /// LNK_SPAN we opened on the connection
    pub(crate) target: TransactionId,
    /// Position in the connection's relay index
    pub(crate) key: RelayKey,
}

#[derive(Debug, Default)]
pub(crate) struct RelayTable {
    by_target: HashMap<TransactionId, Relay>,
}

impl RelayTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, target: &TransactionId) -> Option<&Relay> {
        self.by_target.get(target)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_target.len()
    }

    fn insert(&mut self, relay: Relay) {
        self.by_target.insert(relay.target, relay);
    }

    fn take(&mut self, target: &TransactionId) -> Option<Relay> {
        self.by_target.remove(target)
    }
}

impl SpanState {
    /// Start relaying `link` out `conn`.
    ///
    /// Returns the new relay's key so the caller can continue its merge walk
    /// from there, or `None` if either record is missing.
    pub(crate) fn create_relay(
        &mut self,
        fx: Effects<'_>,
        conn: TransactionId,
        link: TransactionId,
    ) -> Option<RelayKey> {
        let conn_link = self.connections.get(&conn)?.link();
        let source = self.topology.link(&link)?;
        let key = RelayKey::new(source.node, source.key());
        let announcement = source.span.next_hop(fx.random.random_u32());

        fx.transport.hold(link, RefTag::RelaySource);
        let target = fx.transport.open_span(conn_link, &announcement);
        fx.transport.hold(target, RefTag::RelayTarget);
        fx.transport.bind_circuit(target, link);

        if let Some(c) = self.connections.get_mut(&conn) {
            c.relays.insert(key, target);
        }
        if let Some(l) = self.topology.link_mut(&link) {
            l.relays.push_back(target);
        }
        self.relays.insert(Relay {
            conn,
            source: link,
            target,
            key,
        });

        debug!(
            %conn,
            source = %link,
            %target,
            node = %key.node,
            dist = announcement.dist,
            "relay created"
        );
        Some(key)
    }

    /// Tear down the relay whose outgoing transaction is `target`.
    ///
    /// Returns false if the relay was already gone; nothing is touched then.
    pub(crate) fn delete_relay(&mut self, fx: Effects<'_>, target: TransactionId) -> bool {
        let Some(relay) = self.relays.take(&target) else {
            return false;
        };

        if let Some(conn) = self.connections.get_mut(&relay.conn) {
            let removed = conn.relays.remove(&relay.key);
            debug_assert_eq!(removed, Some(target), "relay index out of sync");
        }
        if let Some(link) = self.topology.link_mut(&relay.source) {
            link.relays.retain(|t| *t != target);
        }

        fx.transport.reply(target, 0);
        fx.transport.release(target, RefTag::RelayTarget);
        fx.transport.release(relay.source, RefTag::RelaySource);

        debug!(
            conn = %relay.conn,
            source = %relay.source,
            %target,
            node = %relay.key.node,
            dist = relay.key.dist,
            "relay deleted"
        );
        true
    }

    /// Delete every relay spawned from `link`, oldest first
    pub(crate) fn delete_link_relays(&mut self, fx: Effects<'_>, link: TransactionId) -> usize {
        let mut deleted = 0;
        while let Some(target) = self
            .topology
            .link(&link)
            .and_then(|l| l.relays.front().copied())
        {
            if !self.delete_relay(fx, target) {
                // Stale queue entry; drop it so the loop terminates.
                if let Some(l) = self.topology.link_mut(&link) {
                    l.relays.pop_front();
                }
                continue;
            }
            deleted += 1;
        }
        deleted
    }

    /// Delete every relay carried by `conn`
    pub(crate) fn delete_conn_relays(&mut self, fx: Effects<'_>, conn: TransactionId) -> usize {
        let targets: Vec<TransactionId> = self
            .connections
            .get(&conn)
            .map(|c| c.relays.values().copied().collect())
            .unwrap_or_default();
        targets
            .into_iter()
            .filter(|target| self.delete_relay(fx, *target))
            .count()
    }
}
