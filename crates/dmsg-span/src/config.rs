//! Span relay configuration.

use dmsg_core::{DmsgError, Result};
use serde::{Deserialize, Serialize};

/// Maximum spanning tree distance.
///
/// Stops tail-chasing closed loops when a feeder span is lost.
pub const DEFAULT_MAX_DIST: u32 = 16;

/// Relays per (node, connection) pair.
pub const DEFAULT_FANOUT: usize = 2;

/// Tuning for relay selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanConfig {
    /// Links with a larger hop count are never relayed
    pub max_dist: u32,
    /// Best links relayed out each connection for each node
    pub fanout: usize,
    /// Keep relaying past `fanout` while (dist, rnss) ties the last accepted
    /// link, so both directions pick the same paths
    pub require_symmetric: bool,
}

impl Default for SpanConfig {
    fn default() -> Self {
        Self {
            max_dist: DEFAULT_MAX_DIST,
            fanout: DEFAULT_FANOUT,
            require_symmetric: false,
        }
    }
}

impl SpanConfig {
    /// Defaults with the symmetric overrun mode enabled
    pub fn symmetric() -> Self {
        Self {
            require_symmetric: true,
            ..Default::default()
        }
    }

    /// Small topology bounds for tests
    pub fn testing() -> Self {
        Self {
            max_dist: 4,
            ..Default::default()
        }
    }

    /// Parse a TOML fragment; missing keys keep their defaults
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.fanout == 0 {
            return Err(DmsgError::config("fanout must be greater than 0"));
        }
        // Relays announce dist + 1, which must not overflow.
        if self.max_dist == u32::MAX {
            return Err(DmsgError::config("max_dist must be below u32::MAX"));
        }
        Ok(())
    }
}
