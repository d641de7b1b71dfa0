//! LNK protocol messages as seen by the span subsystem
//!
//! Byte-level framing belongs to the transport. These types carry only the
//! fields the span subsystem consumes or produces.

use crate::identifiers::{Label, MediaId, TransactionId};
use crate::types::{PeerType, PfsType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Span protocol version emitted on relayed announcements
pub const SPAN_PROTO_1: u16 = 1;

/// LNK_SPAN announcement: a filesystem instance reachable at `dist` hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LnkSpan {
    /// Kind of peer that originated the span
    pub peer_type: PeerType,
    /// Cluster identity (shared fsid)
    pub peer_id: Uuid,
    /// Cluster label
    pub peer_label: Label,
    /// Role of the filesystem instance
    pub pfs_type: PfsType,
    /// Unique filesystem instance id
    pub pfs_id: Uuid,
    /// Filesystem instance label
    pub pfs_label: Label,
    /// Relay hops traversed so far
    pub dist: u32,
    /// Random sub-sort accumulated along the path
    pub rnss: u32,
    /// High level protocol support
    pub proto_version: u16,
}

impl LnkSpan {
    /// Create an originating announcement (zero hops, zero sub-sort)
    pub fn new(
        peer_type: PeerType,
        peer_id: Uuid,
        peer_label: impl Into<Label>,
        pfs_type: PfsType,
        pfs_id: Uuid,
        pfs_label: impl Into<Label>,
    ) -> Self {
        Self {
            peer_type,
            peer_id,
            peer_label: peer_label.into(),
            pfs_type,
            pfs_id,
            pfs_label: pfs_label.into(),
            dist: 0,
            rnss: 0,
            proto_version: SPAN_PROTO_1,
        }
    }

    /// Set the hop distance
    pub fn with_dist(mut self, dist: u32) -> Self {
        self.dist = dist;
        self
    }

    /// Set the random sub-sort
    pub fn with_rnss(mut self, rnss: u32) -> Self {
        self.rnss = rnss;
        self
    }

    /// Announcement to send one hop further out.
    ///
    /// `dist` grows by exactly one and `extra_rnss` is folded into the
    /// sub-sort with wrapping arithmetic.
    pub fn next_hop(&self, extra_rnss: u32) -> Self {
        Self {
            dist: self.dist.saturating_add(1),
            rnss: self.rnss.wrapping_add(extra_rnss),
            ..self.clone()
        }
    }
}

/// LNK_CONN handshake: the peer identifies itself and sets its span filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LnkConn {
    /// Media configuration the connection belongs to
    pub media_id: MediaId,
    /// Kind of peer on the other end
    pub peer_type: PeerType,
    /// Role of the peer on the other end
    pub pfs_type: PfsType,
    /// Accepted span peer types (bit per [`PeerType`] code)
    pub peer_mask: u64,
    /// Accepted span pfs types (bit per [`PfsType`] code)
    pub pfs_mask: u64,
    /// Cluster identity filter; nil accepts any cluster
    pub peer_id: Uuid,
    /// Cluster label filter; empty accepts any label
    pub peer_label: Label,
    /// Label of the peer's filesystem
    pub pfs_label: Label,
    /// High level protocol support
    pub proto_version: u16,
}

impl LnkConn {
    /// Connection accepting every span, of the given peer and pfs type
    pub fn accept_all(media_id: MediaId, peer_type: PeerType, pfs_type: PfsType) -> Self {
        Self {
            media_id,
            peer_type,
            pfs_type,
            peer_mask: u64::MAX,
            pfs_mask: u64::MAX,
            peer_id: Uuid::nil(),
            peer_label: Label::default(),
            pfs_label: Label::default(),
            proto_version: SPAN_PROTO_1,
        }
    }

    /// Restrict accepted span peer types
    pub fn with_peer_mask(mut self, mask: u64) -> Self {
        self.peer_mask = mask;
        self
    }

    /// Restrict accepted span pfs types
    pub fn with_pfs_mask(mut self, mask: u64) -> Self {
        self.pfs_mask = mask;
        self
    }

    /// Only accept spans from this cluster identity
    pub fn with_peer_id(mut self, peer_id: Uuid) -> Self {
        self.peer_id = peer_id;
        self
    }

    /// Only accept spans carrying this cluster label
    pub fn with_peer_label(mut self, label: impl Into<Label>) -> Self {
        self.peer_label = label.into();
        self
    }
}

/// Transaction flags on one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxFlags {
    /// Opens the transaction
    pub create: bool,
    /// Closes the sender's side of the transaction
    pub delete: bool,
    /// Sent by the side that did not open the transaction
    pub reply: bool,
}

impl TxFlags {
    /// Opening command
    pub const CREATE: Self = Self {
        create: true,
        delete: false,
        reply: false,
    };
    /// Closing command
    pub const DELETE: Self = Self {
        create: false,
        delete: true,
        reply: false,
    };
    /// One-shot command (open and close in one message)
    pub const ONESHOT: Self = Self {
        create: true,
        delete: true,
        reply: false,
    };
    /// Streaming command in an open transaction
    pub const NONE: Self = Self {
        create: false,
        delete: false,
        reply: false,
    };

    /// The same flags as seen on a reply
    pub fn as_reply(self) -> Self {
        Self {
            reply: true,
            ..self
        }
    }
}

/// Base command of a message's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// LNK_CONN
    Conn,
    /// LNK_SPAN
    Span,
    /// LNK_PING keepalive
    Ping,
    /// Anything the span subsystem does not handle
    Other(u32),
}

/// Payload carried by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// No payload (closes, pings, replies)
    Empty,
    /// Connection handshake
    Conn(LnkConn),
    /// Span announcement
    Span(LnkSpan),
}

/// One message delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Transaction the message belongs to
    pub tx: TransactionId,
    /// Base command of the transaction
    pub command: Command,
    /// Transaction flags
    pub flags: TxFlags,
    /// Error/status code
    pub error: u32,
    /// Payload
    pub payload: Payload,
}

impl Message {
    /// Build a message with no error
    pub fn new(tx: TransactionId, command: Command, flags: TxFlags, payload: Payload) -> Self {
        Self {
            tx,
            command,
            flags,
            error: 0,
            payload,
        }
    }

    /// LNK_CONN open
    pub fn conn_open(tx: TransactionId, conn: LnkConn) -> Self {
        Self::new(tx, Command::Conn, TxFlags::CREATE, Payload::Conn(conn))
    }

    /// LNK_CONN close
    pub fn conn_close(tx: TransactionId) -> Self {
        Self::new(tx, Command::Conn, TxFlags::DELETE, Payload::Empty)
    }

    /// LNK_SPAN open
    pub fn span_open(tx: TransactionId, span: LnkSpan) -> Self {
        Self::new(tx, Command::Span, TxFlags::CREATE, Payload::Span(span))
    }

    /// LNK_SPAN close
    pub fn span_close(tx: TransactionId) -> Self {
        Self::new(tx, Command::Span, TxFlags::DELETE, Payload::Empty)
    }

    /// Remote reply closing a span transaction we opened
    pub fn relay_close(tx: TransactionId) -> Self {
        Self::new(tx, Command::Span, TxFlags::DELETE.as_reply(), Payload::Empty)
    }

    /// Keepalive request
    pub fn ping(tx: TransactionId) -> Self {
        Self::new(tx, Command::Ping, TxFlags::ONESHOT, Payload::Empty)
    }

    /// Set the error code
    pub fn with_error(mut self, error: u32) -> Self {
        self.error = error;
        self
    }

    /// Whether this message is a reply
    pub fn is_reply(&self) -> bool {
        self.flags.reply
    }
}
