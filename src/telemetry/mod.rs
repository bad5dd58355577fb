//! Subevent telemetry.
//!
//! Once procedures are enabled the controller streams one
//! [`SubeventResult`] per subevent. The [`Reporter`] renders each result as
//! it arrives, in delivery order, without buffering:
//!
//! ```text
//! CS Subevent result received:
//!  - Procedure counter: 12
//!  - Procedure done status: 0
//!  - Subevent done status: 0
//!  - Procedure abort reason: 0
//!  - Subevent abort reason: 0
//!  - Reference power level: -16
//!  - Num antenna paths: 1
//!  - Num steps reported: 2
//!  - Step data buffer length: 20 bytes
//! Raw step data:
//!   000102030405060708090a0b0c0d0e0f
//!   10111213
//! CS Subevent end
//! ```
//!
//! The same text can be read back with [`parse_report`] / [`parse_log`].

mod parser;
mod report;
mod steps;
mod subevent;

pub use parser::{parse_log, parse_report, split_reports};
pub use report::{
    hex_dump, Reporter, SubeventReport, BYTES_PER_LINE, RAW_DATA_MARKER, REPORT_END, REPORT_START,
};
pub use steps::{
    parse_steps, PacketQuality, StepFrame, StepMode, StepPayload, Tone, ToneExtension, ToneQuality,
    RSSI_NOT_AVAILABLE, STEP_HEADER_LEN, TONE_LEN,
};
pub use subevent::{DoneStatus, ProcedureAbortReason, SubeventAbortReason, SubeventResult};
