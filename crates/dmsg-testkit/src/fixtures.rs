//! Announcement and handshake builders
//!
//! Identities are derived from names so tests can talk about cluster
//! "alpha" and pfs "node-a" instead of raw UUIDs.

use dmsg_core::{LinkId, LnkConn, LnkSpan, MediaId, PeerType, PfsType, TransactionId};
use uuid::Uuid;

/// Stable UUID for a name. Different names give different ids.
pub fn named_uuid(name: &str) -> Uuid {
    let mut bytes = [0u8; 16];
    for (i, b) in name.bytes().enumerate() {
        let slot = i % 16;
        bytes[slot] = bytes[slot].wrapping_mul(31).wrapping_add(b);
    }
    bytes[15] ^= name.len() as u8;
    Uuid::from_bytes(bytes)
}

/// Peer-opened transaction `msgid` on physical link `link`
pub fn tx(link: u64, msgid: u64) -> TransactionId {
    TransactionId::new(LinkId(link), msgid)
}

/// Transaction `msgid` we opened on physical link `link`
pub fn local_tx(link: u64, msgid: u64) -> TransactionId {
    TransactionId::local(LinkId(link), msgid)
}

/// Builder for a received LNK_SPAN
#[derive(Debug, Clone)]
pub struct SpanBuilder {
    span: LnkSpan,
}

impl SpanBuilder {
    /// HAMMER2 master `pfs` in cluster `cluster`, zero distance
    pub fn new(cluster: &str, pfs: &str) -> Self {
        Self {
            span: LnkSpan::new(
                PeerType::Hammer2,
                named_uuid(cluster),
                cluster,
                PfsType::Master,
                named_uuid(pfs),
                pfs,
            ),
        }
    }

    /// Hop count
    pub fn dist(mut self, dist: u32) -> Self {
        self.span.dist = dist;
        self
    }

    /// Sub-sort
    pub fn rnss(mut self, rnss: u32) -> Self {
        self.span.rnss = rnss;
        self
    }

    /// Peer type of the cluster
    pub fn peer_type(mut self, peer_type: PeerType) -> Self {
        self.span.peer_type = peer_type;
        self
    }

    /// Filesystem role of the node
    pub fn pfs_type(mut self, pfs_type: PfsType) -> Self {
        self.span.pfs_type = pfs_type;
        self
    }

    /// Finished announcement
    pub fn build(self) -> LnkSpan {
        self.span
    }
}

/// Span for `pfs` in `cluster` at `dist`
pub fn span(cluster: &str, pfs: &str, dist: u32) -> LnkSpan {
    SpanBuilder::new(cluster, pfs).dist(dist).build()
}

/// Handshake from a HAMMER2 master on `media` that accepts everything
pub fn conn(media: &str) -> LnkConn {
    LnkConn::accept_all(
        MediaId::from_uuid(named_uuid(media)),
        PeerType::Hammer2,
        PfsType::Master,
    )
}

/// Handshake from a client on `media` that accepts everything
pub fn client_conn(media: &str) -> LnkConn {
    LnkConn::accept_all(
        MediaId::from_uuid(named_uuid(media)),
        PeerType::Hammer2,
        PfsType::Client,
    )
}
