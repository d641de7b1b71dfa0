//! # Dmsg Span - spanning tree over the dmsg mesh
//!
//! Every participant aggregates the LNK_SPAN announcements it receives from
//! all of its connections and re-announces a bounded, loop-free subset out
//! its other connections. The result is a self-healing spanning tree over an
//! arbitrary mesh of point-to-point links.
//!
//! Layers, leaf first:
//!
//! - [`topology`]: clusters → nodes → received links, best link first
//! - connection registry: peers that completed LNK_CONN and the relays each
//!   one carries
//! - relay selection: reconcile a node's best links with a connection's
//!   relays in one ordered walk
//! - relay lifecycle: open, bind and tear down the outgoing span transactions
//! - handlers: the per-message state machine
//!
//! [`SpanService`] wraps all of it behind one lock and is the only type the
//! transport needs.

#![forbid(unsafe_code)]

pub mod config;
mod connection;
mod handlers;
mod relay;
pub mod selection;
pub mod service;
mod state;
pub mod topology;

pub use config::{SpanConfig, DEFAULT_FANOUT, DEFAULT_MAX_DIST};
pub use connection::RelayKey;
pub use selection::Rejection;
pub use service::{ClusterHandle, LinkInfo, RelayInfo, SpanService, TopologyStats};
pub use state::RescanReport;
pub use topology::{ClusterKey, LinkKey, NodeKey, NodeOpaque};
