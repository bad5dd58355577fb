//! Procedure parameters and the procedure-enable record.

use serde::{Deserialize, Serialize};

/// Tone antenna configuration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneAntennaConfig {
    /// One antenna on each side
    A1B1,
    /// Two initiator antennas, one reflector antenna
    A2B1,
    /// Three initiator antennas, one reflector antenna
    A3B1,
    /// Four initiator antennas, one reflector antenna
    A4B1,
    /// One initiator antenna, two reflector antennas
    A1B2,
}

impl ToneAntennaConfig {
    /// HCI encoding
    pub fn code(self) -> u8 {
        match self {
            Self::A1B1 => 0,
            Self::A2B1 => 1,
            Self::A3B1 => 2,
            Self::A4B1 => 3,
            Self::A1B2 => 4,
        }
    }
}

/// PHY used during procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedurePhy {
    /// LE 1M
    Le1M,
    /// LE 2M
    Le2M,
    /// LE Coded S8
    CodedS8,
    /// LE Coded S2
    CodedS2,
}

/// SNR control adjustment; `NotUsed` is encoded as 0xFF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnrControl {
    /// SNR output index 18 dB
    Db18,
    /// SNR output index 21 dB
    Db21,
    /// SNR output index 24 dB
    Db24,
    /// SNR output index 27 dB
    Db27,
    /// SNR output index 30 dB
    Db30,
    /// SNR control not applied
    NotUsed,
}

/// `tx_power_delta` value meaning "no preference"
pub const TX_POWER_DELTA_NO_PREFERENCE: u8 = 0x80;

/// Requested cadence and timing envelope for ranging procedures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureParams {
    /// Configuration id the parameters apply to
    pub config_id: u8,
    /// Maximum procedure length (0.625 ms units)
    pub max_procedure_len: u16,
    /// Minimum procedure interval (connection events)
    pub min_procedure_interval: u16,
    /// Maximum procedure interval (connection events)
    pub max_procedure_interval: u16,
    /// Maximum procedure count (0 = until disabled)
    pub max_procedure_count: u16,
    /// Minimum subevent length in microseconds
    pub min_subevent_len: u32,
    /// Maximum subevent length in microseconds
    pub max_subevent_len: u32,
    /// Tone antenna configuration
    pub tone_antenna_config_selection: ToneAntennaConfig,
    /// Procedure PHY
    pub phy: ProcedurePhy,
    /// Transmit power delta
    pub tx_power_delta: u8,
    /// Preferred peer antenna bitmap
    pub preferred_peer_antenna: u8,
    /// Initiator SNR control
    pub snr_control_initiator: SnrControl,
    /// Reflector SNR control
    pub snr_control_reflector: SnrControl,
}

impl ProcedureParams {
    /// Short, frequent procedures (initiator side)
    pub fn initiator(config_id: u8) -> Self {
        Self {
            config_id,
            max_procedure_len: 1000,
            min_procedure_interval: 10,
            max_procedure_interval: 10,
            max_procedure_count: 0,
            min_subevent_len: 16000,
            max_subevent_len: 16000,
            tone_antenna_config_selection: ToneAntennaConfig::A1B1,
            phy: ProcedurePhy::Le2M,
            tx_power_delta: TX_POWER_DELTA_NO_PREFERENCE,
            preferred_peer_antenna: 1,
            snr_control_initiator: SnrControl::NotUsed,
            snr_control_reflector: SnrControl::NotUsed,
        }
    }

    /// Wide timing bounds suited to a responder
    pub fn reflector(config_id: u8) -> Self {
        Self {
            min_procedure_interval: 1,
            max_procedure_interval: 100,
            min_subevent_len: 10000,
            max_subevent_len: 75000,
            ..Self::initiator(config_id)
        }
    }
}

/// Procedure state reported on enable/disable completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureState {
    /// Procedures are not running
    Disabled,
    /// Procedures are running
    Enabled,
}

/// Selected runtime parameters once procedures are active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureEnableRecord {
    /// Configuration id
    pub config_id: u8,
    /// Active or inactive
    pub state: ProcedureState,
    /// Selected tone antenna configuration index
    pub tone_antenna_config_selection: u8,
    /// Selected transmit power in dBm
    pub selected_tx_power: i8,
    /// Subevent length in microseconds
    pub subevent_len: u32,
    /// Subevents per connection event
    pub subevents_per_event: u8,
    /// Interval between subevents
    pub subevent_interval: u16,
    /// Connection events between CS events
    pub event_interval: u16,
    /// Connection events between procedures
    pub procedure_interval: u16,
    /// Number of procedures (0 = until disabled)
    pub procedure_count: u16,
    /// Maximum procedure length
    pub max_procedure_len: u16,
}

impl ProcedureEnableRecord {
    /// Whether procedures are running
    pub fn is_active(&self) -> bool {
        self.state == ProcedureState::Enabled
    }

    /// Record the controller reports after accepting `params`
    pub fn selected(params: &ProcedureParams, tx_power: i8) -> Self {
        Self {
            config_id: params.config_id,
            state: ProcedureState::Enabled,
            tone_antenna_config_selection: params.tone_antenna_config_selection.code(),
            selected_tx_power: tx_power,
            subevent_len: params.max_subevent_len,
            subevents_per_event: 1,
            subevent_interval: 0,
            event_interval: 1,
            procedure_interval: params.min_procedure_interval,
            procedure_count: params.max_procedure_count,
            max_procedure_len: params.max_procedure_len,
        }
    }

    /// Inactive record for `config_id`
    pub fn disabled(config_id: u8) -> Self {
        Self {
            config_id,
            state: ProcedureState::Disabled,
            tone_antenna_config_selection: 0,
            selected_tx_power: 0,
            subevent_len: 0,
            subevents_per_event: 0,
            subevent_interval: 0,
            event_interval: 0,
            procedure_interval: 0,
            procedure_count: 0,
            max_procedure_len: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflector_bounds_are_wider() {
        let ini = ProcedureParams::initiator(0);
        let refl = ProcedureParams::reflector(0);

        assert_eq!((ini.min_procedure_interval, ini.max_procedure_interval), (10, 10));
        assert_eq!((ini.min_subevent_len, ini.max_subevent_len), (16000, 16000));
        assert_eq!((refl.min_procedure_interval, refl.max_procedure_interval), (1, 100));
        assert_eq!((refl.min_subevent_len, refl.max_subevent_len), (10000, 75000));
        assert_eq!(refl.max_procedure_len, ini.max_procedure_len);
        assert_eq!(refl.phy, ProcedurePhy::Le2M);
        assert_eq!(refl.tx_power_delta, 0x80);
    }

    #[test]
    fn test_selected_record_is_active() {
        let record = ProcedureEnableRecord::selected(&ProcedureParams::initiator(0), -4);
        assert!(record.is_active());
        assert_eq!(record.procedure_interval, 10);
        assert!(!ProcedureEnableRecord::disabled(0).is_active());
    }
}
