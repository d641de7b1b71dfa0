//! Recording topology observer

use dmsg_core::{LnkConn, LnkSpan, MediaId, NodeId, TopologyObserver, TransactionId};
use parking_lot::Mutex;

/// One observer notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// Connection handshake completed
    ConnOpened(TransactionId, MediaId),
    /// Node record created
    NodeAdded(NodeId, LnkSpan),
    /// Node record deleted
    NodeRemoved(NodeId, LnkSpan),
    /// Last connection on a media closed
    MediaReleased(MediaId),
}

/// Observer that keeps every notification
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TopologyEvent>>,
}

impl RecordingObserver {
    /// Create an empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications so far, in order
    pub fn events(&self) -> Vec<TopologyEvent> {
        self.events.lock().clone()
    }

    /// Node and media notifications, without connection opens
    pub fn topology_events(&self) -> Vec<TopologyEvent> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, TopologyEvent::ConnOpened(..)))
            .collect()
    }
}

impl TopologyObserver for RecordingObserver {
    fn conn_opened(&self, conn: TransactionId, handshake: &LnkConn) {
        self.events
            .lock()
            .push(TopologyEvent::ConnOpened(conn, handshake.media_id));
    }

    fn node_added(&self, node: NodeId, span: &LnkSpan) {
        self.events
            .lock()
            .push(TopologyEvent::NodeAdded(node, span.clone()));
    }

    fn node_removed(&self, node: NodeId, span: &LnkSpan) {
        self.events
            .lock()
            .push(TopologyEvent::NodeRemoved(node, span.clone()));
    }

    fn media_released(&self, media: MediaId) {
        self.events.lock().push(TopologyEvent::MediaReleased(media));
    }
}
