//! Recovery actions performed when a session's link drops.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CsError;
use crate::protocol::SessionSummary;

/// Reset performed by the host after link loss.
///
/// Called exactly once per link-loss event, after the session reached
/// `Terminated`. No session state may survive the reset.
pub trait RestartAction: Send + Sync {
    /// Perform the reset
    fn restart(&self, ended: &SessionSummary);
}

/// Recreate runtime state in-process
#[derive(Debug, Default)]
pub struct InProcessRestart {
    count: AtomicUsize,
}

impl InProcessRestart {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts performed so far
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RestartAction for InProcessRestart {
    fn restart(&self, ended: &SessionSummary) {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(session = %ended.session_id, restarts = n, "Resetting ranging state");
    }
}

/// Exit the process and let an external supervisor cold-start it
#[derive(Debug, Clone, Copy)]
pub struct ProcessRestart {
    exit_code: i32,
}

impl ProcessRestart {
    /// Exit with `exit_code` on restart
    pub fn new(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

impl RestartAction for ProcessRestart {
    fn restart(&self, ended: &SessionSummary) {
        tracing::warn!(
            session = %ended.session_id,
            "Link lost, exiting with code {} for a cold restart",
            self.exit_code
        );
        std::process::exit(self.exit_code);
    }
}

/// Which [`RestartAction`] the host installs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryMode {
    /// [`InProcessRestart`]
    #[default]
    InProcess,
    /// [`ProcessRestart`]
    Exit,
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => f.write_str("in-process"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

impl FromStr for RecoveryMode {
    type Err = CsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in-process" | "inprocess" | "reset" => Ok(Self::InProcess),
            "exit" | "process" | "reboot" => Ok(Self::Exit),
            other => Err(CsError::Config(format!("Unknown recovery mode: {other}"))),
        }
    }
}
