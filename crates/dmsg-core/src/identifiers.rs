//! Identifier types shared by the transport and the span subsystem
//!
//! Transaction state objects belong to the transport. The span subsystem only
//! ever refers to them by [`TransactionId`], which is totally ordered and so
//! doubles as the final tie-break when sorting links and relays.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum label length in bytes, excluding the wire terminator.
pub const LABEL_MAX: usize = 127;

/// Identity of one underlying physical link (one iocom / socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Which side opened a transaction.
///
/// Each end of a physical link allocates message ids on its own, so a
/// transaction the peer opened and one we opened may carry the same msgid.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Origin {
    /// Opened by the peer (received LNK_CONN and LNK_SPAN)
    #[default]
    Remote,
    /// Opened by us (relayed LNK_SPAN)
    Local,
}

/// Identity of a transaction state held by the transport.
///
/// The physical link sorts first, then the message id, then the side that
/// opened the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId {
    /// Physical link the transaction lives on
    pub link: LinkId,
    /// Message id of the transaction's opening message
    pub msgid: u64,
    /// Side that opened the transaction
    #[serde(default)]
    pub origin: Origin,
}

impl TransactionId {
    /// Transaction opened by the peer
    pub const fn new(link: LinkId, msgid: u64) -> Self {
        Self {
            link,
            msgid,
            origin: Origin::Remote,
        }
    }

    /// Transaction opened by us
    pub const fn local(link: LinkId, msgid: u64) -> Self {
        Self {
            link,
            msgid,
            origin: Origin::Local,
        }
    }

    /// Whether we opened the transaction
    pub const fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local)
    }

    /// Smallest possible id, used as a lower range bound
    pub const MIN: Self = Self::new(LinkId(0), 0);
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Origin::Remote => write!(f, "tx-{}:{}", self.link.0, self.msgid),
            Origin::Local => write!(f, "tx-{}:{}/local", self.link.0, self.msgid),
        }
    }
}

/// Stable handle of a node record inside one topology.
///
/// Handles are never reused while the topology lives, so relays keyed by
/// node handle stay contiguous per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Media configuration identity declared by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaId(pub Uuid);

impl MediaId {
    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media-{}", self.0)
    }
}

impl From<Uuid> for MediaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Bounded label string (cluster or pfs label).
///
/// Labels arriving from the transport are never rejected. Anything past
/// [`LABEL_MAX`] bytes or after an embedded NUL is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Build a label, truncating to the wire bound on a char boundary.
    pub fn truncated(value: &str) -> Self {
        let value = match value.find('\0') {
            Some(nul) => &value[..nul],
            None => value,
        };
        let mut end = value.len().min(LABEL_MAX);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        Self(value[..end].to_owned())
    }

    /// Decode a fixed-size wire field, forcing termination.
    pub fn from_wire(raw: &[u8]) -> Self {
        let bounded = &raw[..raw.len().min(LABEL_MAX)];
        let end = bounded.iter().position(|b| *b == 0).unwrap_or(bounded.len());
        Self::truncated(&String::from_utf8_lossy(&bounded[..end]))
    }

    /// Borrow the label text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the label is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self::truncated(&value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::truncated(value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}
