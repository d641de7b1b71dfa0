//! Connection registry.
//!
//! One record per peer that completed the LNK_CONN handshake and so is
//! eligible to receive relayed spans. Each record indexes the relays it
//! carries by [`RelayKey`], which sorts by node first and then exactly like
//! [`LinkKey`]. A node's relays are therefore contiguous and in the same
//! order as the node's links, which is what lets selection merge the two in
//! one pass.

use crate::topology::LinkKey;
use dmsg_core::{LinkId, LnkConn, MediaId, NodeId, TransactionId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Position of a relay in its connection's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelayKey {
    /// Node the relayed link belongs to
    pub node: NodeId,
    /// Source link hop count
    pub dist: u32,
    /// Source link sub-sort
    pub rnss: u32,
    /// Source link transaction
    pub source: TransactionId,
}

impl RelayKey {
    /// Key for relaying the link with `key` under `node`
    pub fn new(node: NodeId, key: LinkKey) -> Self {
        Self {
            node,
            dist: key.dist,
            rnss: key.rnss,
            source: key.tx,
        }
    }

    /// Smallest key belonging to `node`
    fn node_floor(node: NodeId) -> Self {
        Self {
            node,
            dist: 0,
            rnss: 0,
            source: TransactionId::MIN,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) tx: TransactionId,
    pub(crate) handshake: LnkConn,
    /// Relays carried by this connection → their outgoing transaction
    pub(crate) relays: BTreeMap<RelayKey, TransactionId>,
}

impl Connection {
    /// Physical link the connection runs over
    pub(crate) fn link(&self) -> LinkId {
        self.tx.link
    }

    /// First relay for `node`, if any
    pub(crate) fn first_relay_for(&self, node: NodeId) -> Option<RelayKey> {
        self.relays
            .range(RelayKey::node_floor(node)..)
            .next()
            .map(|(key, _)| *key)
            .filter(|key| key.node == node)
    }

    /// Relay following `after` for the same node, if any
    pub(crate) fn next_relay_after(&self, after: &RelayKey) -> Option<RelayKey> {
        self.relays
            .range((Bound::Excluded(*after), Bound::Unbounded))
            .next()
            .map(|(key, _)| *key)
            .filter(|key| key.node == after.node)
    }

    /// `from` and every later relay for the same node
    pub(crate) fn relays_from(&self, from: &RelayKey) -> Vec<TransactionId> {
        self.relays
            .range(*from..)
            .take_while(|(key, _)| key.node == from.node)
            .map(|(_, target)| *target)
            .collect()
    }
}

/// Connections in the order they opened, plus media reference counts.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    conns: IndexMap<TransactionId, Connection>,
    media: BTreeMap<MediaId, u32>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns false if one already exists for `tx`.
    pub(crate) fn register(&mut self, tx: TransactionId, handshake: LnkConn) -> bool {
        if self.conns.contains_key(&tx) {
            return false;
        }
        *self.media.entry(handshake.media_id).or_insert(0) += 1;
        self.conns.insert(
            tx,
            Connection {
                tx,
                handshake,
                relays: BTreeMap::new(),
            },
        );
        true
    }

    /// Remove a connection whose relays are already gone.
    ///
    /// Returns the record and, when it was the last user of its media, the
    /// released media id.
    pub(crate) fn unregister(&mut self, tx: &TransactionId) -> Option<(Connection, Option<MediaId>)> {
        let conn = self.conns.shift_remove(tx)?;
        debug_assert!(conn.relays.is_empty(), "connection {tx} removed with live relays");

        let media = conn.handshake.media_id;
        let released = match self.media.get_mut(&media) {
            Some(refs) if *refs > 1 => {
                *refs -= 1;
                None
            }
            Some(_) => {
                self.media.remove(&media);
                Some(media)
            }
            None => None,
        };
        Some((conn, released))
    }

    pub(crate) fn get(&self, tx: &TransactionId) -> Option<&Connection> {
        self.conns.get(tx)
    }

    pub(crate) fn get_mut(&mut self, tx: &TransactionId) -> Option<&mut Connection> {
        self.conns.get_mut(tx)
    }

    /// Connection transactions in open order
    pub(crate) fn ids(&self) -> Vec<TransactionId> {
        self.conns.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.conns.len()
    }

    pub(crate) fn media_refs(&self, media: &MediaId) -> u32 {
        self.media.get(media).copied().unwrap_or(0)
    }
}
