//! Request side of the external collaborators.
//!
//! The link stack, the pairing/security layer and the ranging controller are
//! outside this crate. The core only issues requests through these traits and
//! waits for the matching event on [`RangingEvents`](crate::protocol::RangingEvents).
//!
//! Every request returns immediately: `Ok(())` means the request was queued,
//! an error means it was refused outright and no completion will follow.

use thiserror::Error;

use crate::protocol::{
    CreateConfigParams, CreateContext, DefaultSettings, LinkHandle, ProcedureParams,
    SecurityLevel,
};

/// Immediate refusal of a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The stack returned an error code
    #[error("request rejected (err {0})")]
    Rejected(i32),

    /// The link is not (or no longer) connected
    #[error("not connected")]
    NotConnected,

    /// The stack is not available
    #[error("stack unavailable: {0}")]
    Unavailable(String),
}

/// Result of a gateway request
pub type GatewayResult = std::result::Result<(), GatewayError>;

/// Connection lifecycle
pub trait LinkGateway: Send + Sync {
    /// Bring up the radio stack
    fn enable(&self) -> GatewayResult;

    /// Scan for a reflector and connect to the first match
    fn start_scan(&self) -> GatewayResult;

    /// Advertise as connectable and wait for an initiator
    fn start_advertising(&self) -> GatewayResult;
}

/// Link encryption
pub trait SecurityGateway: Send + Sync {
    /// Request `level` on `link`; answered by `security_changed`
    fn set_security(&self, link: &LinkHandle, level: SecurityLevel) -> GatewayResult;
}

/// Channel Sounding commands
pub trait RangingGateway: Send + Sync {
    /// Apply default settings; no completion event
    fn set_default_settings(&self, link: &LinkHandle, settings: &DefaultSettings)
        -> GatewayResult;

    /// Read the peer's capabilities; answered by `remote_capabilities`
    fn read_remote_capabilities(&self, link: &LinkHandle) -> GatewayResult;

    /// Create a configuration; answered by `config_created`
    fn create_config(
        &self,
        link: &LinkHandle,
        params: &CreateConfigParams,
        context: CreateContext,
    ) -> GatewayResult;

    /// Start CS security; answered by `security_enabled`
    fn security_enable(&self, link: &LinkHandle) -> GatewayResult;

    /// Set procedure parameters; no completion event
    fn set_procedure_parameters(&self, link: &LinkHandle, params: &ProcedureParams)
        -> GatewayResult;

    /// Enable or disable procedures; answered by `procedure_enabled`
    fn procedure_enable(&self, link: &LinkHandle, config_id: u8, enable: bool) -> GatewayResult;
}

/// Everything a role needs from its environment
pub trait Gateway: LinkGateway + SecurityGateway + RangingGateway {}

impl<T: LinkGateway + SecurityGateway + RangingGateway> Gateway for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        assert_eq!(
            GatewayError::Rejected(-5).to_string(),
            "request rejected (err -5)"
        );
        assert_eq!(GatewayError::NotConnected.to_string(), "not connected");
    }
}
