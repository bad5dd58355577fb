//! Reads rendered subevent blocks back out of a log.
//!
//! Lines may carry any log prefix (`I: `, a tracing timestamp and target,
//! ...) or be JSON log records, in which case the `fields.message` value is
//! used. Header values are located by their labels; hex-dump lines are the
//! last whitespace-separated token of each line between the raw-data marker
//! and the end marker. Other log lines interleaved in the dump are skipped.

use std::borrow::Cow;

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;

use super::report::{RAW_DATA_MARKER, REPORT_END, REPORT_START};
use super::SubeventResult;
use crate::error::{CsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ProcedureCounter,
    ProcedureDoneStatus,
    SubeventDoneStatus,
    ProcedureAbortReason,
    SubeventAbortReason,
    ReferencePowerLevel,
    NumAntennaPaths,
    NumStepsReported,
}

const FIELD_LABELS: [(Field, &str); 8] = [
    (Field::ProcedureCounter, "Procedure counter"),
    (Field::ProcedureDoneStatus, "Procedure done status"),
    (Field::SubeventDoneStatus, "Subevent done status"),
    (Field::ProcedureAbortReason, "Procedure abort reason"),
    (Field::SubeventAbortReason, "Subevent abort reason"),
    (Field::ReferencePowerLevel, "Reference power level"),
    (Field::NumAntennaPaths, "Num antenna paths"),
    (Field::NumStepsReported, "Num steps reported"),
];

lazy_static! {
    static ref FIELD_REGEX: Vec<(Field, &'static str, Regex)> = FIELD_LABELS
        .iter()
        .filter_map(|(field, label)| {
            Regex::new(&format!(r"(?m){label}:\s*(-?\d+)"))
                .ok()
                .map(|re| (*field, *label, re))
        })
        .collect();
    static ref BUFFER_LEN_REGEX: Option<Regex> =
        Regex::new(r"(?m)Step data buffer length:\s*(\d+) bytes").ok();
}

/// Message text of a log line; JSON records yield their `fields.message`
fn log_message(line: &str) -> Cow<'_, str> {
    if !line.trim_start().starts_with('{') {
        return Cow::Borrowed(line);
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(record) => match record["fields"]["message"].as_str() {
            Some(message) => Cow::Owned(message.to_string()),
            None => Cow::Borrowed(line),
        },
        Err(_) => Cow::Borrowed(line),
    }
}

/// Split a log into the text of each complete subevent block.
///
/// A block opened but never closed (log cut off mid-result) is dropped.
pub fn split_reports(log: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<Cow<'_, str>>> = None;

    for line in log.lines().map(log_message) {
        if line.contains(REPORT_START) {
            current = Some(vec![line]);
            continue;
        }
        if let Some(block) = current.as_mut() {
            let end = line.contains(REPORT_END);
            block.push(line);
            if end {
                if let Some(block) = current.take() {
                    blocks.push(block.join("\n"));
                }
            }
        }
    }

    blocks
}

/// Parse one rendered block into a subevent result
pub fn parse_report(text: &str) -> Result<SubeventResult> {
    let mut result = SubeventResult::default();

    for (field, label, re) in FIELD_REGEX.iter() {
        let value = re
            .captures(text)
            .and_then(|c| c.get(1))
            .ok_or_else(|| CsError::Parse(format!("Missing field: {label}")))?
            .as_str();
        let out_of_range = || CsError::Parse(format!("{label} out of range: {value}"));

        match field {
            Field::ProcedureCounter => {
                result.procedure_counter = value.parse().map_err(|_| out_of_range())?;
            },
            Field::ProcedureDoneStatus => {
                result.procedure_done_status = value.parse().map_err(|_| out_of_range())?;
            },
            Field::SubeventDoneStatus => {
                result.subevent_done_status = value.parse().map_err(|_| out_of_range())?;
            },
            Field::ProcedureAbortReason => {
                result.procedure_abort_reason = value.parse().map_err(|_| out_of_range())?;
            },
            Field::SubeventAbortReason => {
                result.subevent_abort_reason = value.parse().map_err(|_| out_of_range())?;
            },
            Field::ReferencePowerLevel => {
                result.reference_power_level = value.parse().map_err(|_| out_of_range())?;
            },
            Field::NumAntennaPaths => {
                result.num_antenna_paths = value.parse().map_err(|_| out_of_range())?;
            },
            Field::NumStepsReported => {
                result.num_steps_reported = value.parse().map_err(|_| out_of_range())?;
            },
        }
    }

    let declared_len = BUFFER_LEN_REGEX
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok());

    let data = parse_hex_dump(text);
    if let Some(expected) = declared_len {
        if data.len() != expected {
            return Err(CsError::Parse(format!(
                "Step data length mismatch: declared {expected}, found {}",
                data.len()
            )));
        }
    }
    if !data.is_empty() {
        result.step_data = Some(Bytes::from(data));
    }

    Ok(result)
}

/// Parse every complete block in `log`, skipping blocks that fail to parse
pub fn parse_log(log: &str) -> Vec<SubeventResult> {
    split_reports(log)
        .iter()
        .filter_map(|block| match parse_report(block) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("Skipping subevent block: {e}");
                None
            },
        })
        .collect()
}

fn parse_hex_dump(text: &str) -> Vec<u8> {
    let mut data = Vec::new();
    let mut in_dump = false;

    for line in text.lines().map(log_message) {
        if line.contains(RAW_DATA_MARKER) {
            in_dump = true;
            continue;
        }
        if !in_dump {
            continue;
        }
        if line.contains(REPORT_END) {
            break;
        }
        let Some(token) = line.split_whitespace().last() else {
            continue;
        };
        match hex::decode(token) {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(_) => tracing::debug!("Skipping non-dump line inside block: {line}"),
        }
    }

    data
}
