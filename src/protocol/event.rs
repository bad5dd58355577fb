//! Asynchronous events delivered by the gateways.
//!
//! The controller reports every step's outcome out of band. Gateways push
//! events through [`RangingEvents`], one method per event kind; the core
//! supplies the single implementation.

use super::{
    CapabilitySnapshot, ConfigRecord, DisconnectReason, HciStatus, LinkHandle, LinkId,
    ProcedureEnableRecord, SecurityLevel, Step,
};
use crate::telemetry::SubeventResult;

/// Event hooks the gateways call from their own execution context.
///
/// Implementations must not block: they run on the controller's dispatch
/// context, concurrently with the task driving the negotiation.
pub trait RangingEvents: Send + Sync {
    /// Link established (or failed to establish when `status` is not success)
    fn connected(&self, link: LinkHandle, status: HciStatus);

    /// Link lost
    fn disconnected(&self, link: LinkId, reason: DisconnectReason);

    /// Link security level changed, or failed to change
    fn security_changed(&self, link: LinkId, level: SecurityLevel, status: HciStatus);

    /// Remote capability exchange finished
    fn remote_capabilities(
        &self,
        link: LinkId,
        status: HciStatus,
        capabilities: Option<CapabilitySnapshot>,
    );

    /// Configuration created
    fn config_created(&self, link: LinkId, status: HciStatus, config: Option<ConfigRecord>);

    /// CS security enabled
    fn security_enabled(&self, link: LinkId, status: HciStatus);

    /// Procedures enabled or disabled
    fn procedure_enabled(
        &self,
        link: LinkId,
        status: HciStatus,
        record: Option<ProcedureEnableRecord>,
    );

    /// One subevent result is available
    fn subevent_result(&self, link: LinkId, result: SubeventResult);
}

/// Payload of a step completion
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionPayload {
    /// Security level reached
    Security(SecurityLevel),
    /// Remote capabilities
    Capabilities(Option<CapabilitySnapshot>),
    /// Created configuration
    Config(Option<ConfigRecord>),
    /// CS security enabled (no payload)
    SecurityEnabled,
    /// Procedure enable record
    ProcedureEnable(Option<ProcedureEnableRecord>),
}

/// Completion signal for one negotiation step
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Link the completion belongs to
    pub link: LinkId,
    /// Controller status
    pub status: HciStatus,
    /// Step-specific payload
    pub payload: CompletionPayload,
}

impl Completion {
    /// Step this completion acknowledges
    pub fn step(&self) -> Step {
        match self.payload {
            CompletionPayload::Security(_) => Step::Security,
            CompletionPayload::Capabilities(_) => Step::Capabilities,
            CompletionPayload::Config(_) => Step::Config,
            CompletionPayload::SecurityEnabled => Step::SecurityEnable,
            CompletionPayload::ProcedureEnable(_) => Step::ProcedureEnable,
        }
    }

    /// Whether the controller reported success
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
