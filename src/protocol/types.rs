//! HCI-level value types shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status code carried by a controller completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HciStatus(pub u8);

impl HciStatus {
    /// Command completed successfully
    pub const SUCCESS: Self = Self(0x00);
    /// Unknown connection identifier
    pub const UNKNOWN_CONN_ID: Self = Self(0x02);
    /// Authentication failure
    pub const AUTH_FAILURE: Self = Self(0x05);
    /// Unsupported feature or parameter value
    pub const UNSUPPORTED_FEATURE: Self = Self(0x11);
    /// Invalid HCI command parameters
    pub const INVALID_PARAMS: Self = Self(0x12);
    /// Unspecified error
    pub const UNSPECIFIED: Self = Self(0x1F);

    /// Whether the status reports success
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for HciStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Reason code delivered with a disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisconnectReason(pub u8);

impl DisconnectReason {
    /// Supervision timeout expired
    pub const CONNECTION_TIMEOUT: Self = Self(0x08);
    /// Peer closed the connection
    pub const REMOTE_USER_TERMINATED: Self = Self(0x13);
    /// Local host closed the connection
    pub const LOCAL_HOST_TERMINATED: Self = Self(0x16);
}

impl Default for DisconnectReason {
    fn default() -> Self {
        Self::REMOTE_USER_TERMINATED
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Connection handle as assigned by the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u16);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Exclusive reference to an established link.
///
/// Deliberately neither `Clone` nor `Copy`: the link gateway hands the
/// handle over on connect and the owning [`Session`](super::Session) keeps it
/// until the session is dropped. Requests borrow it.
#[derive(Debug, PartialEq, Eq)]
pub struct LinkHandle {
    id: LinkId,
    peer: String,
}

impl LinkHandle {
    /// Take ownership of a freshly connected link
    pub fn new(id: LinkId, peer: impl Into<String>) -> Self {
        Self {
            id,
            peer: peer.into(),
        }
    }

    /// Connection handle
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Peer address as reported by the link layer
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Link-layer security level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// No encryption
    L1,
    /// Encryption without MITM protection
    L2,
    /// Encryption with MITM protection
    L3,
    /// LE Secure Connections with MITM protection
    L4,
}

impl SecurityLevel {
    /// Numeric level (1..=4)
    pub fn level(self) -> u8 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
            Self::L3 => 3,
            Self::L4 => 4,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Channel Sounding role of the local device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Drives negotiation and requests procedures
    Initiator,
    /// Responds to negotiation and reflects tones
    Reflector,
}

impl Role {
    /// HCI encoding of the role
    pub fn code(self) -> u8 {
        match self {
            Self::Initiator => 0,
            Self::Reflector => 1,
        }
    }

    /// Descriptive name
    pub fn name(self) -> &'static str {
        match self {
            Self::Initiator => "Initiator",
            Self::Reflector => "Reflector",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initiator" | "ini" => Ok(Self::Initiator),
            "reflector" | "ref" => Ok(Self::Reflector),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}
