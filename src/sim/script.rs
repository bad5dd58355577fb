//! Scenario description for the simulated controller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::{DisconnectReason, HciStatus, Step};

/// What the simulated peer and controller do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScript {
    /// Peer address reported on connect
    pub peer: String,
    /// Connections offered before the simulated peer goes quiet
    pub connections: u32,
    /// Completion status per step (missing steps succeed)
    pub statuses: HashMap<Step, u8>,
    /// Requests refused outright, with the error code returned
    pub refusals: HashMap<Step, i32>,
    /// Drop the link instead of completing this step
    pub disconnect_at: Option<Step>,
    /// Report procedures as disabled on enable
    pub procedures_disabled: bool,
    /// Subevent results streamed per connection once procedures run
    pub results_per_connection: u32,
    /// Raw step buffer length of every result
    pub step_data_len: usize,
    /// Delay before each delivered event, in milliseconds
    pub latency_ms: u64,
    /// Drop the link once all results were streamed
    pub disconnect_after_results: bool,
    /// Disconnect reason reported
    pub disconnect_reason: u8,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            peer: "C0:DE:C0:FF:EE:01 (random)".to_string(),
            connections: 1,
            statuses: HashMap::new(),
            refusals: HashMap::new(),
            disconnect_at: None,
            procedures_disabled: false,
            results_per_connection: 4,
            step_data_len: 20,
            latency_ms: 1,
            disconnect_after_results: true,
            disconnect_reason: DisconnectReason::REMOTE_USER_TERMINATED.0,
        }
    }
}

impl SimScript {
    /// Completion status for `step`
    pub fn status(&self, step: Step) -> HciStatus {
        self.statuses
            .get(&step)
            .map_or(HciStatus::SUCCESS, |&code| HciStatus(code))
    }

    /// Immediate error for `step`, if refused
    pub fn refusal(&self, step: Step) -> Option<i32> {
        self.refusals.get(&step).copied()
    }

    /// Whether the link drops at `step`
    pub fn drops_at(&self, step: Step) -> bool {
        self.disconnect_at == Some(step)
    }

    /// Reason reported on disconnect
    pub fn reason(&self) -> DisconnectReason {
        DisconnectReason(self.disconnect_reason)
    }

    /// Fail `step` with `status`
    #[must_use]
    pub fn failing(mut self, step: Step, status: HciStatus) -> Self {
        self.statuses.insert(step, status.0);
        self
    }

    /// Refuse the request for `step` with `code`
    #[must_use]
    pub fn refusing(mut self, step: Step, code: i32) -> Self {
        self.refusals.insert(step, code);
        self
    }

    /// Drop the link at `step`
    #[must_use]
    pub fn dropping_at(mut self, step: Step) -> Self {
        self.disconnect_at = Some(step);
        self
    }
}
