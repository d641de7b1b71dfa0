//! Effect interfaces consumed by the span subsystem
//!
//! The span subsystem holds no threads and performs no I/O of its own. It
//! drives the transport, the random source and the owning layer exclusively
//! through these traits, which keeps it deterministic under test.
//!
//! # Contract
//!
//! Every method is called with the subsystem's lock held, so implementations
//! must not block and must not call back into the subsystem. Sending is a
//! non-blocking enqueue.

use crate::identifiers::{LinkId, MediaId, NodeId, TransactionId};
use crate::messages::{LnkConn, LnkSpan, Message};

/// Named reference the subsystem holds on a transaction state.
///
/// A reference is taken whenever a record stores the transaction id
/// persistently and released when the record lets go of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefTag {
    /// Held by a connection record on its LNK_CONN transaction
    Conn,
    /// Held by a link record on its received LNK_SPAN transaction
    Link,
    /// Held by a relay on the LNK_SPAN transaction it re-announces
    RelaySource,
    /// Held by a relay on the LNK_SPAN transaction it opened
    RelayTarget,
}

/// Reliable transactional transport the span subsystem sits on.
pub trait TransportEffects: Send + Sync {
    /// Open a new LNK_SPAN transaction on `link` carrying `span`.
    ///
    /// The returned id has [`Origin::Local`](crate::Origin::Local).
    fn open_span(&self, link: LinkId, span: &LnkSpan) -> TransactionId;

    /// Reply with a status while leaving the transaction open.
    fn result(&self, tx: TransactionId, error: u32);

    /// Reply with a status and close our side of the transaction.
    fn reply(&self, tx: TransactionId, error: u32);

    /// Take a named reference on a transaction state.
    fn hold(&self, tx: TransactionId, tag: RefTag);

    /// Drop a named reference on a transaction state.
    fn release(&self, tx: TransactionId, tag: RefTag);

    /// Forward sub-transactions opened against `outgoing` to `source`.
    ///
    /// This is what makes a relay a usable virtual circuit.
    fn bind_circuit(&self, outgoing: TransactionId, source: TransactionId);

    /// Hand a message the subsystem does not consume to the owning layer.
    fn deliver(&self, msg: &Message);

    /// Wake the owning event loop; topology work is pending for `link`.
    fn signal(&self, link: LinkId);
}

/// Blanket implementation for Arc<T> where T: TransportEffects
impl<T: TransportEffects + ?Sized> TransportEffects for std::sync::Arc<T> {
    fn open_span(&self, link: LinkId, span: &LnkSpan) -> TransactionId {
        (**self).open_span(link, span)
    }

    fn result(&self, tx: TransactionId, error: u32) {
        (**self).result(tx, error);
    }

    fn reply(&self, tx: TransactionId, error: u32) {
        (**self).reply(tx, error);
    }

    fn hold(&self, tx: TransactionId, tag: RefTag) {
        (**self).hold(tx, tag);
    }

    fn release(&self, tx: TransactionId, tag: RefTag) {
        (**self).release(tx, tag);
    }

    fn bind_circuit(&self, outgoing: TransactionId, source: TransactionId) {
        (**self).bind_circuit(outgoing, source);
    }

    fn deliver(&self, msg: &Message) {
        (**self).deliver(msg);
    }

    fn signal(&self, link: LinkId) {
        (**self).signal(link);
    }
}

/// Source of fresh 32-bit random values for relay sub-sorts.
pub trait RandomEffects: Send + Sync {
    /// Produce a fresh value
    fn random_u32(&self) -> u32;
}

/// Blanket implementation for Arc<T> where T: RandomEffects
impl<T: RandomEffects + ?Sized> RandomEffects for std::sync::Arc<T> {
    fn random_u32(&self) -> u32 {
        (**self).random_u32()
    }
}

/// Production random source backed by the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomEffects for OsRandom {
    fn random_u32(&self) -> u32 {
        rand::random()
    }
}

/// Callbacks into the owning layer when connections and topology records
/// come and go.
///
/// All methods default to no-ops.
pub trait TopologyObserver: Send + Sync {
    /// A peer completed the LNK_CONN handshake on `conn`.
    fn conn_opened(&self, _conn: TransactionId, _handshake: &LnkConn) {}

    /// A node record was created for the first span naming it.
    fn node_added(&self, _node: NodeId, _span: &LnkSpan) {}

    /// The last link of a node closed and the node record was removed.
    fn node_removed(&self, _node: NodeId, _span: &LnkSpan) {}

    /// The last connection on a media configuration closed.
    fn media_released(&self, _media: MediaId) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TopologyObserver for NoopObserver {}
