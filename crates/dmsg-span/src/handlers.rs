//! Protocol handlers.
//!
//! Entry points for the messages the transport hands the subsystem. Each
//! runs to completion under the service lock, mutates the topology and
//! connection state, reconverges whatever the change can affect, and then
//! signals the owning event loop.
//!
//! Messages that do not match local state are rejected with
//! [`DmsgError::Protocol`] before anything is touched: a close for a
//! transaction we never saw open, a second open on the same transaction, an
//! open on a transaction we initiated ourselves, or the wrong payload.

use crate::state::{Effects, SpanState};
use crate::topology::ClusterKey;
use dmsg_core::{
    Command, DmsgError, LnkConn, LnkSpan, Message, Payload, RefTag, Result, TransactionId,
    TransportEffects,
};
use tracing::{debug, info, trace, warn};

fn reject(tx: TransactionId, message: &str) -> DmsgError {
    warn!(%tx, reason = message, "protocol message rejected");
    DmsgError::protocol(tx, message)
}

/// Keepalive: answer requests, pass replies up. Touches no topology state.
pub(crate) fn ping(transport: &dyn TransportEffects, msg: &Message) -> Result<()> {
    if msg.is_reply() {
        transport.deliver(msg);
    } else {
        transport.reply(msg.tx, 0);
    }
    Ok(())
}

impl SpanState {
    // =========================================================================
    // LNK_CONN
    // =========================================================================

    /// A peer completed the connection handshake.
    pub(crate) fn conn_open(
        &mut self,
        fx: Effects<'_>,
        tx: TransactionId,
        handshake: LnkConn,
    ) -> Result<()> {
        if tx.is_local() {
            return Err(reject(tx, "connection open on a local transaction"));
        }
        let media = handshake.media_id;
        let peer_type = handshake.peer_type;
        if !self.connections.register(tx, handshake) {
            return Err(reject(tx, "connection already open"));
        }
        fx.transport.hold(tx, RefTag::Conn);
        fx.transport.result(tx, 0);
        info!(
            conn = %tx,
            %media,
            %peer_type,
            media_refs = self.connections.media_refs(&media),
            "connection opened"
        );

        self.rescan(fx, Some(tx), None);
        if let Some(conn) = self.connections.get(&tx) {
            fx.observer.conn_opened(tx, &conn.handshake);
        }
        fx.transport.signal(tx.link);
        Ok(())
    }

    /// A connection went away. Every relay it carried is closed.
    pub(crate) fn conn_close(&mut self, fx: Effects<'_>, tx: TransactionId) -> Result<()> {
        if self.connections.get(&tx).is_none() {
            return Err(reject(tx, "close for unknown connection"));
        }

        let relays = self.delete_conn_relays(fx, tx);
        let released = self
            .connections
            .unregister(&tx)
            .and_then(|(_, released)| released);
        fx.transport.release(tx, RefTag::Conn);
        fx.transport.reply(tx, 0);
        info!(conn = %tx, relays, "connection closed");

        if let Some(media) = released {
            debug!(%media, "media released");
            fx.observer.media_released(media);
        }
        fx.transport.signal(tx.link);
        Ok(())
    }

    // =========================================================================
    // LNK_SPAN
    // =========================================================================

    /// A remote node announced a span. The transaction stays open as a
    /// virtual circuit for as long as the link lives.
    pub(crate) fn span_open(
        &mut self,
        fx: Effects<'_>,
        tx: TransactionId,
        span: LnkSpan,
    ) -> Result<()> {
        if tx.is_local() {
            return Err(reject(tx, "span open on a local transaction"));
        }
        if self.topology.link(&tx).is_some() {
            return Err(reject(tx, "span already open"));
        }

        let cluster = ClusterKey::from_span(&span);
        let (node, created) = self.topology.find_or_create_node(&cluster, &span);
        if created {
            info!(
                %node,
                cluster = %cluster.peer_label,
                pfs = %span.pfs_label,
                pfs_type = ?span.pfs_type,
                "node added"
            );
            fx.observer.node_added(node, &span);
        }

        let dist = span.dist;
        self.topology.insert_link(node, tx, span);
        fx.transport.hold(tx, RefTag::Link);
        fx.transport.result(tx, 0);
        debug!(link = %tx, %node, dist, "span opened");

        self.rescan(fx, None, Some(node));
        fx.transport.signal(tx.link);
        Ok(())
    }

    /// A received span was withdrawn.
    ///
    /// Relays spawned from the link go first, then the link itself; the node
    /// and cluster follow if the link was their last. A surviving node is
    /// rescanned so its next best link can take over.
    pub(crate) fn span_close(&mut self, fx: Effects<'_>, tx: TransactionId) -> Result<()> {
        if self.topology.link(&tx).is_none() {
            return Err(reject(tx, "close for unknown span"));
        }

        let relays = self.delete_link_relays(fx, tx);
        let Some(removal) = self.topology.remove_link(tx) else {
            return Err(reject(tx, "close for unknown span"));
        };
        fx.transport.release(tx, RefTag::Link);
        fx.transport.reply(tx, 0);
        debug!(link = %tx, node = %removal.link.node, relays, "span closed");

        match removal.node {
            Some(node) => {
                info!(
                    node = %node.id,
                    cluster_removed = removal.cluster_removed,
                    "node removed"
                );
                fx.observer.node_removed(node.id, &node.origin);
            }
            None => {
                self.rescan(fx, None, Some(removal.link.node));
            }
        }
        fx.transport.signal(tx.link);
        Ok(())
    }

    /// Traffic on a span transaction we opened ourselves.
    ///
    /// Only a close matters: the relay is torn down unless local teardown
    /// already got to it, and the transaction is closed either way.
    pub(crate) fn relay_message(&mut self, fx: Effects<'_>, msg: &Message) -> Result<()> {
        if !msg.flags.delete {
            trace!(target_tx = %msg.tx, "relay reply ignored");
            return Ok(());
        }
        if !self.delete_relay(fx, msg.tx) {
            trace!(target_tx = %msg.tx, "relay already gone");
            fx.transport.reply(msg.tx, 0);
        }
        Ok(())
    }

    // =========================================================================
    // LNK_PING and dispatch
    // =========================================================================

    /// Route one message by command and transaction flags.
    pub(crate) fn dispatch(&mut self, fx: Effects<'_>, msg: &Message) -> Result<()> {
        match msg.command {
            Command::Conn => {
                if msg.is_reply() || !(msg.flags.create || msg.flags.delete) {
                    fx.transport.deliver(msg);
                    return Ok(());
                }
                if msg.flags.create {
                    let Payload::Conn(handshake) = &msg.payload else {
                        return Err(reject(msg.tx, "connection open without LNK_CONN payload"));
                    };
                    self.conn_open(fx, msg.tx, handshake.clone())?;
                }
                if msg.flags.delete {
                    self.conn_close(fx, msg.tx)?;
                }
                Ok(())
            }
            Command::Span => {
                if msg.is_reply() {
                    return self.relay_message(fx, msg);
                }
                if !(msg.flags.create || msg.flags.delete) {
                    fx.transport.deliver(msg);
                    return Ok(());
                }
                if msg.flags.create {
                    let Payload::Span(span) = &msg.payload else {
                        return Err(reject(msg.tx, "span open without LNK_SPAN payload"));
                    };
                    self.span_open(fx, msg.tx, span.clone())?;
                }
                if msg.flags.delete {
                    self.span_close(fx, msg.tx)?;
                }
                Ok(())
            }
            Command::Ping => ping(fx.transport, msg),
            Command::Other(_) => {
                fx.transport.deliver(msg);
                Ok(())
            }
        }
    }
}
