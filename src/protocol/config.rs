//! CS configuration: creation parameters and the negotiated record.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Role;

/// Number of bytes in a CS channel map (79 channels, one bit each)
pub const CHANNEL_MAP_LEN: usize = 10;

/// Highest CS channel index
pub const MAX_CHANNEL: u8 = 78;

/// Main mode of a CS configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MainMode {
    /// Mode-1: round-trip time
    Rtt,
    /// Mode-2: phase-based ranging
    Pbr,
    /// Mode-3: RTT and PBR
    RttPbr,
}

impl MainMode {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::Rtt => 1,
            Self::Pbr => 2,
            Self::RttPbr => 3,
        }
    }
}

impl fmt::Display for MainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtt => write!(f, "{} (Mode-1: RTT)", self.code()),
            Self::Pbr => write!(f, "{} (Mode-2: PBR)", self.code()),
            Self::RttPbr => write!(f, "{} (Mode-3: RTT+PBR)", self.code()),
        }
    }
}

/// RTT packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RttType {
    /// Access address only
    AaOnly,
    /// 32-bit sounding sequence
    Sounding32,
    /// 96-bit sounding sequence
    Sounding96,
}

impl RttType {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::AaOnly => 0,
            Self::Sounding32 => 1,
            Self::Sounding96 => 3,
        }
    }
}

/// PHY used for CS sync packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhy {
    /// LE 1M
    Le1M,
    /// LE 2M
    Le2M,
    /// LE 2M 2BT
    Le2M2Bt,
}

impl SyncPhy {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::Le1M => 1,
            Self::Le2M => 2,
            Self::Le2M2Bt => 3,
        }
    }
}

/// Channel selection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSelection {
    /// Algorithm #3b
    Type3B,
    /// Algorithm #3c
    Type3C,
}

impl ChannelSelection {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::Type3B => 0,
            Self::Type3C => 1,
        }
    }
}

/// Channel #3c shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ch3cShape {
    /// Hat shape
    Hat,
    /// X shape
    X,
}

impl Ch3cShape {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::Hat => 0,
            Self::X => 1,
        }
    }
}

/// Which sides the configuration is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateContext {
    /// Local controller only
    LocalOnly,
    /// Local controller and remote peer
    LocalAndRemote,
}

/// Bitmap of CS channels allowed in a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap(pub [u8; CHANNEL_MAP_LEN]);

impl ChannelMap {
    /// Channels that may never be used for CS
    pub const FORBIDDEN: [u8; 7] = [0, 1, 23, 24, 25, 77, 78];

    /// Every channel the CS channel plan allows
    pub fn valid() -> Self {
        let mut map = [0xFF; CHANNEL_MAP_LEN];
        map[0] = 0xFC;
        map[2] = 0x7F;
        map[3] = 0xFC;
        map[9] = 0x1F;
        Self(map)
    }

    /// Whether `channel` is enabled
    pub fn is_enabled(&self, channel: u8) -> bool {
        if channel > MAX_CHANNEL {
            return false;
        }
        self.0[usize::from(channel / 8)] & (1 << (channel % 8)) != 0
    }

    /// Number of enabled channels
    pub fn count(&self) -> usize {
        (0..=MAX_CHANNEL).filter(|ch| self.is_enabled(*ch)).count()
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::valid()
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Parameters of a create-config request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConfigParams {
    /// Configuration id
    pub id: u8,
    /// Main mode (no sub mode)
    pub mode: MainMode,
    /// Minimum main-mode steps per subevent
    pub min_main_mode_steps: u8,
    /// Maximum main-mode steps per subevent
    pub max_main_mode_steps: u8,
    /// Main-mode repetition
    pub main_mode_repetition: u8,
    /// Mode-0 steps per subevent
    pub mode_0_steps: u8,
    /// Local role
    pub role: Role,
    /// RTT type
    pub rtt_type: RttType,
    /// CS sync PHY
    pub cs_sync_phy: SyncPhy,
    /// Allowed channels
    pub channel_map: ChannelMap,
    /// Channel map repetition
    pub channel_map_repetition: u8,
    /// Channel selection algorithm
    pub channel_selection_type: ChannelSelection,
    /// Shape for algorithm #3c
    pub ch3c_shape: Ch3cShape,
    /// Jump for algorithm #3c
    pub ch3c_jump: u8,
}

impl CreateConfigParams {
    /// Phase-based ranging as driven by the initiator
    pub fn pbr_initiator(id: u8) -> Self {
        Self {
            id,
            mode: MainMode::Pbr,
            min_main_mode_steps: 2,
            max_main_mode_steps: 5,
            main_mode_repetition: 0,
            mode_0_steps: 3,
            role: Role::Initiator,
            rtt_type: RttType::AaOnly,
            cs_sync_phy: SyncPhy::Le1M,
            channel_map: ChannelMap::valid(),
            channel_map_repetition: 1,
            channel_selection_type: ChannelSelection::Type3B,
            ch3c_shape: Ch3cShape::Hat,
            ch3c_jump: 2,
        }
    }
}

/// Negotiated configuration, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Configuration id
    pub id: u8,
    /// Main mode
    pub mode: MainMode,
    /// Minimum main-mode steps
    pub min_main_mode_steps: u8,
    /// Maximum main-mode steps
    pub max_main_mode_steps: u8,
    /// Main-mode repetition
    pub main_mode_repetition: u8,
    /// Mode-0 steps
    pub mode_0_steps: u8,
    /// Local role in this configuration
    pub role: Role,
    /// RTT type
    pub rtt_type: RttType,
    /// CS sync PHY
    pub cs_sync_phy: SyncPhy,
    /// Allowed channels
    pub channel_map: ChannelMap,
    /// Channel map repetition
    pub channel_map_repetition: u8,
    /// Channel selection algorithm
    pub channel_selection_type: ChannelSelection,
    /// Shape for algorithm #3c
    pub ch3c_shape: Ch3cShape,
    /// Jump for algorithm #3c
    pub ch3c_jump: u8,
}

impl ConfigRecord {
    /// Record as the controller reports it for `role`'s side of `params`
    pub fn from_params(params: &CreateConfigParams, role: Role) -> Self {
        Self {
            id: params.id,
            mode: params.mode,
            min_main_mode_steps: params.min_main_mode_steps,
            max_main_mode_steps: params.max_main_mode_steps,
            main_mode_repetition: params.main_mode_repetition,
            mode_0_steps: params.mode_0_steps,
            role,
            rtt_type: params.rtt_type,
            cs_sync_phy: params.cs_sync_phy,
            channel_map: params.channel_map,
            channel_map_repetition: params.channel_map_repetition,
            channel_selection_type: params.channel_selection_type,
            ch3c_shape: params.ch3c_shape,
            ch3c_jump: params.ch3c_jump,
        }
    }
}
