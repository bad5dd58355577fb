//! Ranging capabilities and default settings.
//!
//! The remote capability snapshot is read once per session during the
//! capability exchange. The core only cares that it arrived; the fields are
//! kept for logging and for callers that want to inspect the peer.

use serde::{Deserialize, Serialize};

/// Remote peer's reported Channel Sounding capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    /// Number of CS configurations supported
    pub num_config_supported: u8,
    /// Maximum consecutive procedures (0 = unbounded)
    pub max_consecutive_procedures_supported: u16,
    /// Number of antennas
    pub num_antennas_supported: u8,
    /// Maximum antenna paths
    pub max_antenna_paths_supported: u8,
    /// Peer can act as initiator
    pub initiator_supported: bool,
    /// Peer can act as reflector
    pub reflector_supported: bool,
    /// Mode-3 (RTT + PBR) support
    pub mode_3_supported: bool,
}

impl Default for CapabilitySnapshot {
    fn default() -> Self {
        Self {
            num_config_supported: 4,
            max_consecutive_procedures_supported: 0,
            num_antennas_supported: 1,
            max_antenna_paths_supported: 1,
            initiator_supported: true,
            reflector_supported: true,
            mode_3_supported: false,
        }
    }
}

impl CapabilitySnapshot {
    /// Whether the peer can take the opposite role of `local`
    pub fn complements(&self, local: super::Role) -> bool {
        match local {
            super::Role::Initiator => self.reflector_supported,
            super::Role::Reflector => self.initiator_supported,
        }
    }
}

/// CS sync antenna selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AntennaSelection {
    /// Fixed antenna by index (1..=4)
    Antenna(u8),
    /// Antennas used in repetitive order
    Repetitive,
    /// No recommendation
    NoRecommendation,
}

impl AntennaSelection {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::Antenna(index) => index,
            Self::Repetitive => 0xFE,
            Self::NoRecommendation => 0xFF,
        }
    }
}

/// Maximum transmit power accepted by the controller, in dBm
pub const MAX_TX_POWER_DBM: i8 = 20;

/// Per-link default ranging settings (fire-and-forget request)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// Allow the local initiator role
    pub enable_initiator_role: bool,
    /// Allow the local reflector role
    pub enable_reflector_role: bool,
    /// Antenna selection for CS sync packets
    pub cs_sync_antenna_selection: AntennaSelection,
    /// Maximum transmit power in dBm
    pub max_tx_power: i8,
}

impl DefaultSettings {
    /// Enable exactly one local role
    pub fn for_role(role: super::Role) -> Self {
        Self {
            enable_initiator_role: role == super::Role::Initiator,
            enable_reflector_role: role == super::Role::Reflector,
            cs_sync_antenna_selection: AntennaSelection::Repetitive,
            max_tx_power: MAX_TX_POWER_DBM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;

    #[test]
    fn test_default_settings_enable_one_role() {
        let ini = DefaultSettings::for_role(Role::Initiator);
        assert!(ini.enable_initiator_role);
        assert!(!ini.enable_reflector_role);
        assert_eq!(ini.cs_sync_antenna_selection.code(), 0xFE);
        assert_eq!(ini.max_tx_power, 20);

        let refl = DefaultSettings::for_role(Role::Reflector);
        assert!(!refl.enable_initiator_role);
        assert!(refl.enable_reflector_role);
    }

    #[test]
    fn test_capabilities_complement_role() {
        let caps = CapabilitySnapshot {
            reflector_supported: false,
            ..Default::default()
        };
        assert!(!caps.complements(Role::Initiator));
        assert!(caps.complements(Role::Reflector));
    }
}
