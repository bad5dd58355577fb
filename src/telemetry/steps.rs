//! Splits a raw subevent buffer into step frames.
//!
//! Each step is `mode (1) | channel (1) | len (1) | payload (len)`.
//! Mode-0 and Mode-2 payloads are decoded into [`StepPayload`]; Mode-1 and
//! Mode-3 payloads are kept opaque in [`StepFrame::data`].

use bytes::Bytes;
use serde::Serialize;

use crate::protocol::MAX_CHANNEL;

/// Size of a step header
pub const STEP_HEADER_LEN: usize = 3;

/// `Packet_RSSI` value meaning "not available"
pub const RSSI_NOT_AVAILABLE: u8 = 0x7F;

/// Size of one Mode-2 tone: 3 bytes PCT, 1 byte quality
pub const TONE_LEN: usize = 4;

/// CS step mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepMode {
    /// Calibration
    Mode0,
    /// RTT
    Mode1,
    /// PBR
    Mode2,
    /// RTT + PBR
    Mode3,
}

impl StepMode {
    /// Decode a mode byte
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Mode0),
            1 => Some(Self::Mode1),
            2 => Some(Self::Mode2),
            3 => Some(Self::Mode3),
            _ => None,
        }
    }
}

/// Mode-0 packet quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketQuality {
    /// Access address check succeeded
    AaSuccess,
    /// Access address had bit errors
    AaBitErrors,
    /// Access address not found
    AaNotFound,
    /// Code outside the table
    Unknown(u8),
}

impl PacketQuality {
    /// Decode a quality byte
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::AaSuccess,
            0x01 => Self::AaBitErrors,
            0x02 => Self::AaNotFound,
            other => Self::Unknown(other),
        }
    }
}

/// Tone quality indicator (low nibble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToneQuality {
    /// High
    High,
    /// Medium
    Medium,
    /// Low
    Low,
    /// Not available
    Unavailable,
    /// Code outside the table
    Unknown(u8),
}

impl ToneQuality {
    /// Decode a quality nibble
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::High,
            0x01 => Self::Medium,
            0x02 => Self::Low,
            0x03 => Self::Unavailable,
            other => Self::Unknown(other),
        }
    }
}

/// Tone extension slot indicator (high nibble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToneExtension {
    /// Not a tone extension slot
    NotExtensionSlot,
    /// Extension slot, no tone expected
    NotExpected,
    /// Extension slot, tone expected
    Expected,
    /// Code outside the table
    Unknown(u8),
}

impl ToneExtension {
    /// Decode an extension nibble
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::NotExtensionSlot,
            0x01 => Self::NotExpected,
            0x02 => Self::Expected,
            other => Self::Unknown(other),
        }
    }
}

/// One Mode-2 tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tone {
    /// In-phase PCT component (12-bit signed)
    pub pct_i: i16,
    /// Quadrature PCT component (12-bit signed)
    pub pct_q: i16,
    /// Quality indicator
    pub quality: ToneQuality,
    /// Extension slot indicator
    pub extension: ToneExtension,
}

impl Tone {
    fn decode(raw: &[u8]) -> Self {
        let bits = u32::from(raw[0]) | (u32::from(raw[1]) << 8) | (u32::from(raw[2]) << 16);
        Self {
            pct_i: sign_extend_12(bits),
            pct_q: sign_extend_12(bits >> 12),
            quality: ToneQuality::from_code(raw[3] & 0x0F),
            extension: ToneExtension::from_code(raw[3] >> 4),
        }
    }

    /// Magnitude of the PCT vector
    pub fn magnitude(&self) -> f64 {
        f64::from(self.pct_i).hypot(f64::from(self.pct_q))
    }

    /// Phase of the PCT vector in radians
    pub fn phase(&self) -> f64 {
        f64::from(self.pct_q).atan2(f64::from(self.pct_i))
    }
}

fn sign_extend_12(bits: u32) -> i16 {
    let value = (bits & 0xFFF) as i16;
    if value >= 0x800 {
        value - 0x1000
    } else {
        value
    }
}

/// Decoded step payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPayload {
    /// Calibration step
    Mode0 {
        /// Packet quality
        packet_quality: PacketQuality,
        /// RSSI in dBm, absent when not available
        packet_rssi: Option<i8>,
        /// Antenna used for the packet
        packet_antenna: u8,
        /// Measured frequency offset in 0.01 ppm (initiator only)
        freq_offset: Option<i16>,
    },
    /// PBR step
    Mode2 {
        /// Antenna permutation index
        antenna_permutation_index: u8,
        /// Two to five tones
        tones: Vec<Tone>,
    },
    /// Mode-1 or Mode-3 step, not decoded
    Opaque,
}

impl StepPayload {
    /// Decode `data` for `mode`; `None` when the length is invalid for the mode
    pub fn decode(mode: StepMode, data: &[u8]) -> Option<Self> {
        match mode {
            StepMode::Mode0 => decode_mode0(data),
            StepMode::Mode2 => decode_mode2(data),
            StepMode::Mode1 | StepMode::Mode3 => Some(Self::Opaque),
        }
    }
}

fn decode_mode0(data: &[u8]) -> Option<StepPayload> {
    if data.len() != 3 && data.len() != 5 {
        tracing::warn!("Invalid Mode 0 data length: {}, expected 3 or 5", data.len());
        return None;
    }
    Some(StepPayload::Mode0 {
        packet_quality: PacketQuality::from_code(data[0]),
        packet_rssi: (data[1] != RSSI_NOT_AVAILABLE).then(|| data[1] as i8),
        packet_antenna: data[2],
        freq_offset: (data.len() == 5).then(|| i16::from_le_bytes([data[3], data[4]])),
    })
}

fn decode_mode2(data: &[u8]) -> Option<StepPayload> {
    let Some((&antenna_permutation_index, tones)) = data.split_first() else {
        tracing::warn!("Invalid Mode 2 data length: 0");
        return None;
    };
    if tones.len() % TONE_LEN != 0 {
        tracing::warn!("Invalid Mode 2 data length: {}", data.len());
        return None;
    }
    let count = tones.len() / TONE_LEN;
    if !(2..=5).contains(&count) {
        tracing::warn!("Invalid number of tones in Mode 2: {count}, expected 2-5");
        return None;
    }
    Some(StepPayload::Mode2 {
        antenna_permutation_index,
        tones: tones.chunks_exact(TONE_LEN).map(Tone::decode).collect(),
    })
}

/// One step of a subevent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFrame {
    /// Step mode
    pub mode: StepMode,
    /// Channel index
    pub channel: u8,
    /// Raw payload
    #[serde(serialize_with = "hex::serde::serialize")]
    pub data: Bytes,
    /// Decoded payload
    pub payload: StepPayload,
}

/// Split `buffer` into step frames.
///
/// Steps with an unknown mode, an out-of-range channel or a payload length
/// invalid for their mode are skipped; a truncated header or payload ends
/// parsing.
pub fn parse_steps(buffer: &Bytes) -> Vec<StepFrame> {
    let mut steps = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        if offset + STEP_HEADER_LEN > buffer.len() {
            tracing::warn!("Incomplete step header at offset {offset}");
            break;
        }

        let mode = buffer[offset];
        let channel = buffer[offset + 1];
        let len = usize::from(buffer[offset + 2]);
        let start = offset + STEP_HEADER_LEN;
        let end = start + len;

        let Some(mode) = StepMode::from_code(mode) else {
            tracing::warn!("Invalid mode {mode} at offset {offset}, skipping step");
            offset = end;
            continue;
        };
        if channel > MAX_CHANNEL {
            tracing::warn!("Invalid channel {channel} at offset {offset}, skipping step");
            offset = end;
            continue;
        }
        if end > buffer.len() {
            tracing::warn!("Incomplete step data at offset {offset}");
            break;
        }

        let data = buffer.slice(start..end);
        if let Some(payload) = StepPayload::decode(mode, &data) {
            steps.push(StepFrame {
                mode,
                channel,
                data,
                payload,
            });
        }
        offset = end;
    }

    steps
}
