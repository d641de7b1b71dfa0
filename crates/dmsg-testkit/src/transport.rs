//! Recording transport
//!
//! An in-memory [`TransportEffects`] that performs nothing and remembers
//! everything. Tests drive a service against it and then inspect which span
//! transactions were opened, which were closed, and whether every reference
//! the service took was handed back.
//!
//! Outgoing message ids count from 1 on each physical link, the same small
//! numbers tests use for remote transactions, so only the origin tells them
//! apart.

use dmsg_core::{LinkId, LnkSpan, Message, RefTag, TransactionId, TransportEffects};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One call the service made into the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// New outgoing LNK_SPAN
    OpenSpan {
        /// Physical link it went out on
        link: LinkId,
        /// Transaction allocated for it
        tx: TransactionId,
        /// Announcement sent
        span: LnkSpan,
    },
    /// Status reply, transaction left open
    Result {
        /// Transaction replied to
        tx: TransactionId,
        /// Status code
        error: u32,
    },
    /// Status reply closing our side
    Reply {
        /// Transaction replied to
        tx: TransactionId,
        /// Status code
        error: u32,
    },
    /// Reference taken
    Hold {
        /// Referenced transaction
        tx: TransactionId,
        /// Reference name
        tag: RefTag,
    },
    /// Reference dropped
    Release {
        /// Referenced transaction
        tx: TransactionId,
        /// Reference name
        tag: RefTag,
    },
    /// Circuit binding
    BindCircuit {
        /// Transaction opened by the service
        outgoing: TransactionId,
        /// Transaction sub-traffic is forwarded to
        source: TransactionId,
    },
    /// Message passed up to the owning layer
    Deliver(Message),
    /// Event loop wakeup
    Signal(LinkId),
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<TransportEvent>,
    next_msgid: HashMap<LinkId, u64>,
    refs: BTreeMap<(TransactionId, RefTag), i64>,
    outgoing: BTreeMap<TransactionId, (LinkId, LnkSpan)>,
    closed: BTreeSet<TransactionId>,
    circuits: HashMap<TransactionId, TransactionId>,
}

/// Transport double that records every call
#[derive(Debug, Default)]
pub struct RecordingTransport {
    state: Mutex<Recording>,
}

impl RecordingTransport {
    /// Create an empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order
    pub fn events(&self) -> Vec<TransportEvent> {
        self.state.lock().events.clone()
    }

    /// Forget recorded events; reference counts and open transactions stay
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Outgoing span transactions opened and not yet closed by the service
    pub fn open_outgoing(&self) -> Vec<TransactionId> {
        let state = self.state.lock();
        state
            .outgoing
            .keys()
            .filter(|tx| !state.closed.contains(tx))
            .copied()
            .collect()
    }

    /// Open outgoing span transactions on one physical link
    pub fn open_outgoing_on(&self, link: LinkId) -> Vec<TransactionId> {
        self.open_outgoing()
            .into_iter()
            .filter(|tx| tx.link == link)
            .collect()
    }

    /// Announcement sent when `tx` was opened
    pub fn announcement(&self, tx: TransactionId) -> Option<LnkSpan> {
        self.state
            .lock()
            .outgoing
            .get(&tx)
            .map(|(_, span)| span.clone())
    }

    /// Number of outgoing span transactions ever opened
    pub fn opened_count(&self) -> usize {
        self.state.lock().outgoing.len()
    }

    /// Transactions the service closed with a reply, in order
    pub fn replies(&self) -> Vec<TransactionId> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Reply { tx, .. } => Some(*tx),
                _ => None,
            })
            .collect()
    }

    /// Transactions acknowledged while left open, in order
    pub fn results(&self) -> Vec<TransactionId> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Result { tx, .. } => Some(*tx),
                _ => None,
            })
            .collect()
    }

    /// Messages passed to the owning layer
    pub fn delivered(&self) -> Vec<Message> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Deliver(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of event loop wakeups
    pub fn signal_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, TransportEvent::Signal(_)))
            .count()
    }

    /// Source transaction `outgoing` is bound to
    pub fn circuit(&self, outgoing: TransactionId) -> Option<TransactionId> {
        self.state.lock().circuits.get(&outgoing).copied()
    }

    /// Net references currently held under `tag` on `tx`
    pub fn refs(&self, tx: TransactionId, tag: RefTag) -> i64 {
        self.state
            .lock()
            .refs
            .get(&(tx, tag))
            .copied()
            .unwrap_or(0)
    }

    /// Every (transaction, tag) with a non-zero net count
    pub fn outstanding_refs(&self) -> Vec<(TransactionId, RefTag, i64)> {
        self.state
            .lock()
            .refs
            .iter()
            .filter(|(_, count)| **count != 0)
            .map(|((tx, tag), count)| (*tx, *tag, *count))
            .collect()
    }

    /// No reference was released more often than taken
    pub fn never_over_released(&self) -> bool {
        self.state.lock().refs.values().all(|count| *count >= 0)
    }
}

impl TransportEffects for RecordingTransport {
    fn open_span(&self, link: LinkId, span: &LnkSpan) -> TransactionId {
        let mut state = self.state.lock();
        let next = state.next_msgid.entry(link).or_insert(1);
        let tx = TransactionId::local(link, *next);
        *next += 1;
        state.outgoing.insert(tx, (link, span.clone()));
        state.events.push(TransportEvent::OpenSpan {
            link,
            tx,
            span: span.clone(),
        });
        tx
    }

    fn result(&self, tx: TransactionId, error: u32) {
        self.state
            .lock()
            .events
            .push(TransportEvent::Result { tx, error });
    }

    fn reply(&self, tx: TransactionId, error: u32) {
        let mut state = self.state.lock();
        state.closed.insert(tx);
        state.events.push(TransportEvent::Reply { tx, error });
    }

    fn hold(&self, tx: TransactionId, tag: RefTag) {
        let mut state = self.state.lock();
        *state.refs.entry((tx, tag)).or_insert(0) += 1;
        state.events.push(TransportEvent::Hold { tx, tag });
    }

    fn release(&self, tx: TransactionId, tag: RefTag) {
        let mut state = self.state.lock();
        *state.refs.entry((tx, tag)).or_insert(0) -= 1;
        state.events.push(TransportEvent::Release { tx, tag });
    }

    fn bind_circuit(&self, outgoing: TransactionId, source: TransactionId) {
        let mut state = self.state.lock();
        state.circuits.insert(outgoing, source);
        state
            .events
            .push(TransportEvent::BindCircuit { outgoing, source });
    }

    fn deliver(&self, msg: &Message) {
        self.state
            .lock()
            .events
            .push(TransportEvent::Deliver(msg.clone()));
    }

    fn signal(&self, link: LinkId) {
        self.state.lock().events.push(TransportEvent::Signal(link));
    }
}
