//! Lock-protected state shared by every handler.

use crate::config::SpanConfig;
use crate::connection::ConnectionRegistry;
use crate::relay::RelayTable;
use crate::topology::Topology;
use dmsg_core::{RandomEffects, TopologyObserver, TransportEffects};
use serde::{Deserialize, Serialize};

/// Effect handles borrowed for the duration of one locked operation
#[derive(Clone, Copy)]
pub(crate) struct Effects<'a> {
    pub(crate) transport: &'a dyn TransportEffects,
    pub(crate) random: &'a dyn RandomEffects,
    pub(crate) observer: &'a dyn TopologyObserver,
}

/// Relay churn produced by one rescan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescanReport {
    /// Relays opened
    pub created: usize,
    /// Relays closed
    pub deleted: usize,
}

impl RescanReport {
    /// Whether the rescan changed nothing
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.deleted == 0
    }

    pub(crate) fn merge(&mut self, other: RescanReport) {
        self.created += other.created;
        self.deleted += other.deleted;
    }
}

/// Everything the single subsystem lock serializes
#[derive(Debug)]
pub(crate) struct SpanState {
    pub(crate) config: SpanConfig,
    pub(crate) topology: Topology,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) relays: RelayTable,
}

impl SpanState {
    pub(crate) fn new(config: SpanConfig) -> Self {
        Self {
            config,
            topology: Topology::new(),
            connections: ConnectionRegistry::new(),
            relays: RelayTable::new(),
        }
    }
}
