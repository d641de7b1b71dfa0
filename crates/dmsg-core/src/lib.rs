//! # Dmsg Core - Foundation for the span protocol
//!
//! Shared vocabulary between the transactional message transport and the
//! LNK_SPAN/LNK_CONN topology subsystem:
//!
//! - [`identifiers`]: physical links, transaction ids, node handles, labels
//! - [`types`]: peer and pfs type codes
//! - [`messages`]: LNK_CONN / LNK_SPAN payloads and the message envelope
//! - [`effects`]: traits the subsystem drives (transport, randomness, observer)
//! - [`errors`]: unified error type
//!
//! Nothing here holds state.

#![forbid(unsafe_code)]

pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod messages;
pub mod types;

pub use effects::{
    NoopObserver, OsRandom, RandomEffects, RefTag, TopologyObserver, TransportEffects,
};
pub use errors::{DmsgError, Result};
pub use identifiers::{Label, LinkId, MediaId, NodeId, Origin, TransactionId, LABEL_MAX};
pub use messages::{Command, LnkConn, LnkSpan, Message, Payload, TxFlags, SPAN_PROTO_1};
pub use types::{PeerType, PfsType};
