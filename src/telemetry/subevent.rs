//! Subevent results and their status code tables.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One reported measurement unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubeventResult {
    /// Procedure counter
    pub procedure_counter: u16,
    /// Procedure done status code
    pub procedure_done_status: u8,
    /// Subevent done status code
    pub subevent_done_status: u8,
    /// Procedure abort reason code
    pub procedure_abort_reason: u8,
    /// Subevent abort reason code
    pub subevent_abort_reason: u8,
    /// Reference power level in dBm
    pub reference_power_level: i8,
    /// Number of antenna paths
    pub num_antenna_paths: u8,
    /// Number of steps reported
    pub num_steps_reported: u8,
    /// Raw step data, if any
    pub step_data: Option<Bytes>,
}

impl SubeventResult {
    /// Raw buffer, empty when absent
    pub fn step_data(&self) -> &[u8] {
        self.step_data.as_deref().unwrap_or_default()
    }

    /// Decoded procedure done status
    pub fn procedure_done(&self) -> DoneStatus {
        DoneStatus::from_code(self.procedure_done_status)
    }

    /// Decoded subevent done status
    pub fn subevent_done(&self) -> DoneStatus {
        DoneStatus::from_code(self.subevent_done_status)
    }

    /// Decoded procedure abort reason
    pub fn procedure_abort(&self) -> ProcedureAbortReason {
        ProcedureAbortReason::from_code(self.procedure_abort_reason)
    }

    /// Decoded subevent abort reason
    pub fn subevent_abort(&self) -> SubeventAbortReason {
        SubeventAbortReason::from_code(self.subevent_abort_reason)
    }
}

/// Procedure / subevent done status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneStatus {
    /// All results complete
    Complete,
    /// Partial results, more to follow
    Partial,
    /// All subsequent procedures aborted
    Aborted,
    /// Code outside the table
    Unknown(u8),
}

impl DoneStatus {
    /// Decode a status code
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Complete,
            0x01 => Self::Partial,
            0x0F => Self::Aborted,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for DoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::Partial => f.write_str("partial"),
            Self::Aborted => f.write_str("aborted"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Why a procedure was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureAbortReason {
    /// Not aborted
    None,
    /// Local or remote request
    Requested,
    /// Fewer than 15 channels in the channel map
    TooFewChannels,
    /// Channel map update instant passed
    ChannelMapInstantPassed,
    /// Unspecified
    Unspecified,
    /// Code outside the table
    Unknown(u8),
}

impl ProcedureAbortReason {
    /// Decode a reason code
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::None,
            0x01 => Self::Requested,
            0x02 => Self::TooFewChannels,
            0x03 => Self::ChannelMapInstantPassed,
            0x0F => Self::Unspecified,
            other => Self::Unknown(other),
        }
    }
}

/// Why a subevent was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubeventAbortReason {
    /// Not aborted
    None,
    /// Local or remote request
    Requested,
    /// No CS sync received
    NoCsSync,
    /// Scheduling conflict or limited resources
    SchedulingConflict,
    /// Unspecified
    Unspecified,
    /// Code outside the table
    Unknown(u8),
}

impl SubeventAbortReason {
    /// Decode a reason code
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::None,
            0x01 => Self::Requested,
            0x02 => Self::NoCsSync,
            0x03 => Self::SchedulingConflict,
            0x0F => Self::Unspecified,
            other => Self::Unknown(other),
        }
    }
}
