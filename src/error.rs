//! Channel Sounding ranging error types.
//!
//! Errors fall into three classes:
//!
//! - **Startup**: the link stack or a role policy could not be brought up.
//!   Fatal, no retry.
//! - **Step failure**: a request was refused or its completion reported a
//!   non-success status. Fatal for the initiator, logged by the reflector.
//! - **Link loss**: not a fault but the forced end of a session. The caller
//!   recovers by recreating all session state.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::protocol::{DisconnectReason, HciStatus, Step};

/// Channel Sounding ranging errors.
#[derive(Error, Debug)]
pub enum CsError {
    /// Stack or policy initialisation failed.
    #[error("Startup failed: {0}")]
    Startup(String),

    /// The gateway refused a request outright.
    #[error("Failed to request {step}: {source}")]
    Request {
        /// Step whose request was refused.
        step: Step,
        /// Gateway error.
        #[source]
        source: GatewayError,
    },

    /// The gateway refused the default settings.
    #[error("Failed to set default settings: {0}")]
    DefaultSettings(#[source] GatewayError),

    /// A completion reported a non-success status.
    #[error("{step} failed (HCI status {status})")]
    StepFailed {
        /// Step that failed.
        step: Step,
        /// Controller status.
        status: HciStatus,
    },

    /// Procedure enable succeeded but procedures are not running.
    #[error("Procedures reported disabled after enable")]
    ProceduresInactive,

    /// The link went down.
    #[error("Link lost (reason {0})")]
    LinkLost(DisconnectReason),

    /// Invalid state transition or unmatched completion.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Event producers are gone; no further completion can arrive.
    #[error("Event channel closed")]
    EventsClosed,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Telemetry text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ranging operations
pub type Result<T> = std::result::Result<T, CsError>;

impl CsError {
    /// Whether the error is the end of a session rather than a fault
    pub fn is_link_loss(&self) -> bool {
        matches!(self, CsError::LinkLost(_))
    }
}

impl From<toml::de::Error> for CsError {
    fn from(err: toml::de::Error) -> Self {
        CsError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CsError::StepFailed {
            step: Step::Capabilities,
            status: HciStatus(0x1a),
        };
        assert_eq!(err.to_string(), "capability exchange failed (HCI status 0x1a)");

        let err = CsError::Request {
            step: Step::Config,
            source: GatewayError::Rejected(-22),
        };
        assert_eq!(
            err.to_string(),
            "Failed to request config creation: request rejected (err -22)"
        );
    }

    #[test]
    fn test_link_loss_classification() {
        assert!(CsError::LinkLost(DisconnectReason::CONNECTION_TIMEOUT).is_link_loss());
        assert!(!CsError::EventsClosed.is_link_loss());
    }
}
