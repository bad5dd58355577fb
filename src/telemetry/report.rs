//! Rendering of subevent results.
//!
//! The rendered block is what the offline tooling reads back, so the header
//! order and wording are fixed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::SubeventResult;

/// Bytes per hex-dump line
pub const BYTES_PER_LINE: usize = 16;

/// First line of a rendered block
pub const REPORT_START: &str = "CS Subevent result received:";

/// Line introducing the hex dump
pub const RAW_DATA_MARKER: &str = "Raw step data:";

/// Last line of a rendered block
pub const REPORT_END: &str = "CS Subevent end";

/// Indent in front of every hex-dump line
const HEX_INDENT: &str = "  ";

/// Hex-encode `data`, 16 bytes per line, lowercase, no separators
pub fn hex_dump(data: &[u8]) -> Vec<String> {
    data.chunks(BYTES_PER_LINE).map(hex::encode).collect()
}

/// Rendered form of one subevent result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubeventReport {
    header: Vec<String>,
    step_data_len: usize,
    hex_lines: Vec<String>,
}

impl SubeventReport {
    /// Render `result`
    pub fn new(result: &SubeventResult) -> Self {
        let header = vec![
            format!(" - Procedure counter: {}", result.procedure_counter),
            format!(" - Procedure done status: {}", result.procedure_done_status),
            format!(" - Subevent done status: {}", result.subevent_done_status),
            format!(" - Procedure abort reason: {}", result.procedure_abort_reason),
            format!(" - Subevent abort reason: {}", result.subevent_abort_reason),
            format!(" - Reference power level: {}", result.reference_power_level),
            format!(" - Num antenna paths: {}", result.num_antenna_paths),
            format!(" - Num steps reported: {}", result.num_steps_reported),
        ];
        let data = result.step_data();

        Self {
            header,
            step_data_len: data.len(),
            hex_lines: hex_dump(data),
        }
    }

    /// Header field lines in their fixed order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Hex-dump lines without indent (empty when there is no buffer)
    pub fn hex_lines(&self) -> &[String] {
        &self.hex_lines
    }

    /// Every line of the block, in output order
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.header.len() + self.hex_lines.len() + 4);
        lines.push(REPORT_START.to_string());
        lines.extend(self.header.iter().cloned());
        if self.step_data_len > 0 {
            lines.push(format!(
                " - Step data buffer length: {} bytes",
                self.step_data_len
            ));
            lines.push(RAW_DATA_MARKER.to_string());
            lines.extend(self.hex_lines.iter().map(|l| format!("{HEX_INDENT}{l}")));
        }
        lines.push(REPORT_END.to_string());
        lines
    }
}

impl fmt::Display for SubeventReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Emits rendered subevent results through `tracing`.
///
/// Reporting runs on the controller's dispatch context: it formats and logs,
/// never blocks and never fails.
#[derive(Debug, Default)]
pub struct Reporter {
    reported: AtomicU64,
}

impl Reporter {
    /// Create a reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Render and log one result
    pub fn report(&self, result: &SubeventResult) {
        for line in SubeventReport::new(result).lines() {
            tracing::info!(target: "cs_ranging::telemetry", "{line}");
        }
        self.reported.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of results reported so far
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}
