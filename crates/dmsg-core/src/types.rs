//! Peer and PFS type codes carried by LNK_CONN and LNK_SPAN.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of peer announcing a span or opening a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PeerType {
    /// No peer type declared
    None,
    /// A cluster controller
    Cluster,
    /// Block devices
    Block,
    /// Hammer2-mounted volumes
    Hammer2,
    /// Code not known to this build
    Other(u8),
}

impl PeerType {
    /// Wire code
    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Cluster => 1,
            Self::Block => 2,
            Self::Hammer2 => 3,
            Self::Other(code) => code,
        }
    }

    /// Bit for this type in a connection's 64-bit accept mask.
    ///
    /// Codes of 64 and above can never be accepted.
    pub fn mask_bit(self) -> u64 {
        1u64.checked_shl(u32::from(self.as_u8())).unwrap_or(0)
    }
}

impl From<u8> for PeerType {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Cluster,
            2 => Self::Block,
            3 => Self::Hammer2,
            other => Self::Other(other),
        }
    }
}

impl From<PeerType> for u8 {
    fn from(peer: PeerType) -> Self {
        peer.as_u8()
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Cluster => f.write_str("cluster"),
            Self::Block => f.write_str("block"),
            Self::Hammer2 => f.write_str("hammer2"),
            Self::Other(code) => write!(f, "peer({code})"),
        }
    }
}

/// Role of a filesystem instance within its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PfsType {
    /// No role declared
    None,
    /// Administrative endpoint
    Admin,
    /// Pure client; never shown other clients
    Client,
    /// Cache
    Cache,
    /// Copy
    Copy,
    /// Slave
    Slave,
    /// Soft slave
    SoftSlave,
    /// Soft master
    SoftMaster,
    /// Master
    Master,
    /// Code not known to this build
    Other(u8),
}

impl PfsType {
    /// Wire code
    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Admin => 1,
            Self::Client => 2,
            Self::Cache => 3,
            Self::Copy => 4,
            Self::Slave => 5,
            Self::SoftSlave => 6,
            Self::SoftMaster => 7,
            Self::Master => 8,
            Self::Other(code) => code,
        }
    }

    /// Bit for this type in a connection's 64-bit pfs mask.
    pub fn mask_bit(self) -> u64 {
        1u64.checked_shl(u32::from(self.as_u8())).unwrap_or(0)
    }

    /// Whether this is the pure client role
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }
}

impl From<u8> for PfsType {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Admin,
            2 => Self::Client,
            3 => Self::Cache,
            4 => Self::Copy,
            5 => Self::Slave,
            6 => Self::SoftSlave,
            7 => Self::SoftMaster,
            8 => Self::Master,
            other => Self::Other(other),
        }
    }
}

impl From<PfsType> for u8 {
    fn from(pfs: PfsType) -> Self {
        pfs.as_u8()
    }
}
