//! Session state machine for one ranging negotiation.
//!
//! A session exists from a successful connect until the link is lost. It
//! owns the link handle and tracks which step is outstanding, so at most one
//! request is in flight at any time.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::event::{Completion, CompletionPayload};
use super::{
    CapabilitySnapshot, ConfigRecord, DisconnectReason, HciStatus, LinkHandle, LinkId,
    ProcedureEnableRecord, Role, SecurityLevel,
};
use crate::error::{CsError, Result};

/// Session state machine
///
/// States are ordered; a session only ever moves towards `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// No link
    Disconnected,
    /// Link established
    Connected,
    /// Security elevation requested
    Securing,
    /// Link encrypted
    Secured,
    /// Remote capabilities known
    CapabilityExchange,
    /// Configuration created
    ConfigCreation,
    /// CS security enabled
    SecurityEnable,
    /// Procedure parameters set
    ProcedureParamsSet,
    /// Procedures running
    ProcedureEnabled,
    /// Link lost; the session is finished
    Terminated,
}

impl SessionState {
    /// Whether the session has ended
    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }
}

/// One negotiation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Link security elevation
    Security,
    /// Remote capability exchange
    Capabilities,
    /// Configuration creation
    Config,
    /// CS security enable
    SecurityEnable,
    /// Procedure parameters (no completion event)
    ProcedureParams,
    /// Procedure enable
    ProcedureEnable,
}

impl Step {
    /// State a directive request must start from
    pub fn precondition(self) -> SessionState {
        match self {
            Self::Security => SessionState::Connected,
            Self::Capabilities => SessionState::Secured,
            Self::Config => SessionState::CapabilityExchange,
            Self::SecurityEnable => SessionState::ConfigCreation,
            Self::ProcedureParams => SessionState::SecurityEnable,
            Self::ProcedureEnable => SessionState::ProcedureParamsSet,
        }
    }

    /// State reached when the step succeeds
    pub fn outcome(self) -> SessionState {
        match self {
            Self::Security => SessionState::Secured,
            Self::Capabilities => SessionState::CapabilityExchange,
            Self::Config => SessionState::ConfigCreation,
            Self::SecurityEnable => SessionState::SecurityEnable,
            Self::ProcedureParams => SessionState::ProcedureParamsSet,
            Self::ProcedureEnable => SessionState::ProcedureEnabled,
        }
    }

    /// Whether the controller acknowledges the step with an event
    pub fn has_completion(self) -> bool {
        self != Self::ProcedureParams
    }

    /// Whether `role` may request the step from `state`.
    ///
    /// The reflector sets its procedure parameters as soon as the peer's
    /// configuration exists, whether or not CS security was observed yet.
    pub fn ready(self, role: Role, state: SessionState) -> bool {
        match (role, self) {
            (Role::Reflector, Self::ProcedureParams) => matches!(
                state,
                SessionState::ConfigCreation | SessionState::SecurityEnable
            ),
            _ => state == self.precondition(),
        }
    }

    /// Descriptive name
    pub fn name(self) -> &'static str {
        match self {
            Self::Security => "security elevation",
            Self::Capabilities => "capability exchange",
            Self::Config => "config creation",
            Self::SecurityEnable => "CS security enable",
            Self::ProcedureParams => "procedure parameters",
            Self::ProcedureEnable => "procedure enable",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of applying a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step succeeded; the session is now in this state
    Advanced(SessionState),
    /// Controller reported failure; the state is unchanged
    Failed(HciStatus),
    /// Procedure enable succeeded but reports procedures as disabled
    Inactive,
    /// Completion did not move the session (stale or already past)
    Ignored,
}

/// One ranging negotiation on one link
#[derive(Debug)]
pub struct Session {
    id: String,
    link: LinkHandle,
    role: Role,
    config_id: u8,
    state: SessionState,
    outstanding: Option<Step>,
    security_level: Option<SecurityLevel>,
    capabilities: Option<CapabilitySnapshot>,
    config: Option<ConfigRecord>,
    procedure: Option<ProcedureEnableRecord>,
    disconnect_reason: Option<DisconnectReason>,
    established_at: Instant,
}

impl Session {
    /// Create a session for a freshly connected link
    pub fn new(link: LinkHandle, role: Role, config_id: u8) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            link,
            role,
            config_id,
            state: SessionState::Connected,
            outstanding: None,
            security_level: None,
            capabilities: None,
            config: None,
            procedure: None,
            disconnect_reason: None,
            established_at: Instant::now(),
        }
    }

    /// Session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owned link
    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    /// Local role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Configuration id used for every request
    pub fn config_id(&self) -> u8 {
        self.config_id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Step awaiting its completion, if any
    pub fn outstanding(&self) -> Option<Step> {
        self.outstanding
    }

    /// Remote capabilities (after capability exchange)
    pub fn capabilities(&self) -> Option<&CapabilitySnapshot> {
        self.capabilities.as_ref()
    }

    /// Negotiated configuration (after config creation)
    pub fn config(&self) -> Option<&ConfigRecord> {
        self.config.as_ref()
    }

    /// Last procedure enable record
    pub fn procedure(&self) -> Option<&ProcedureEnableRecord> {
        self.procedure.as_ref()
    }

    /// Whether the session has ended
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }

    /// Register `step` as the one outstanding request
    pub fn begin(&mut self, step: Step) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CsError::Protocol(format!(
                "Cannot request {step}: session terminated"
            )));
        }
        if let Some(outstanding) = self.outstanding {
            return Err(CsError::Protocol(format!(
                "Cannot request {step} while {outstanding} is outstanding"
            )));
        }
        if !step.ready(self.role, self.state) {
            return Err(CsError::Protocol(format!(
                "Cannot request {step} in state {:?}",
                self.state
            )));
        }

        self.outstanding = Some(step);
        if step == Step::Security {
            self.state = SessionState::Securing;
        }
        Ok(())
    }

    /// Drop the outstanding request after the gateway refused it outright
    pub fn abandon(&mut self, step: Step) {
        if self.outstanding == Some(step) {
            self.outstanding = None;
        }
    }

    /// Confirm a step that has no completion event
    pub fn confirm(&mut self, step: Step) -> Result<SessionState> {
        if step.has_completion() {
            return Err(CsError::Protocol(format!(
                "{step} must be acknowledged by its completion"
            )));
        }
        self.take_outstanding(step)?;
        self.advance_to(step.outcome())?;
        Ok(self.state)
    }

    /// Resolve the outstanding request with its completion
    pub fn complete(&mut self, completion: Completion) -> Result<StepOutcome> {
        self.take_outstanding(completion.step())?;
        self.apply(completion)
    }

    /// Record a completion for a step the peer drove.
    ///
    /// Observed steps may skip states the local side never saw, but never
    /// move the session backwards.
    pub fn observe(&mut self, completion: Completion) -> StepOutcome {
        if self.state.is_terminal() {
            return StepOutcome::Ignored;
        }
        if !completion.is_success() {
            return StepOutcome::Failed(completion.status);
        }

        let step = completion.step();
        if step.outcome() <= self.state {
            // Late notifications still refresh the procedure record.
            if let CompletionPayload::ProcedureEnable(Some(record)) = completion.payload {
                let active = record.is_active();
                self.procedure = Some(record);
                if !active {
                    return StepOutcome::Inactive;
                }
            }
            return StepOutcome::Ignored;
        }

        match self.apply(completion) {
            Ok(outcome) => outcome,
            Err(_) => StepOutcome::Ignored,
        }
    }

    /// Force the terminal state after link loss
    pub fn terminate(&mut self, reason: DisconnectReason) {
        self.state = SessionState::Terminated;
        self.outstanding = None;
        self.disconnect_reason = Some(reason);
    }

    /// Snapshot of the session for reporting
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            link: self.link.id(),
            peer: self.link.peer().to_string(),
            role: self.role,
            state: self.state,
            security_level: self.security_level,
            capabilities_known: self.capabilities.is_some(),
            config: self.config.clone(),
            procedure: self.procedure.clone(),
            disconnect_reason: self.disconnect_reason,
            uptime_secs: self.established_at.elapsed().as_secs(),
        }
    }

    fn take_outstanding(&mut self, step: Step) -> Result<()> {
        match self.outstanding {
            Some(outstanding) if outstanding == step => {
                self.outstanding = None;
                Ok(())
            },
            Some(outstanding) => Err(CsError::Protocol(format!(
                "Received {step} completion while {outstanding} is outstanding"
            ))),
            None => Err(CsError::Protocol(format!(
                "Received {step} completion with nothing outstanding"
            ))),
        }
    }

    fn apply(&mut self, completion: Completion) -> Result<StepOutcome> {
        if !completion.is_success() {
            return Ok(StepOutcome::Failed(completion.status));
        }

        let step = completion.step();
        match completion.payload {
            CompletionPayload::Security(level) => self.security_level = Some(level),
            CompletionPayload::Capabilities(caps) => {
                self.capabilities = Some(caps.unwrap_or_default());
            },
            CompletionPayload::Config(config) => {
                let config = config.ok_or_else(|| {
                    CsError::Protocol("Config completion without a record".to_string())
                })?;
                self.config = Some(config);
            },
            CompletionPayload::SecurityEnabled => {},
            CompletionPayload::ProcedureEnable(record) => {
                let record = record.ok_or_else(|| {
                    CsError::Protocol("Procedure enable completion without a record".to_string())
                })?;
                let active = record.is_active();
                self.procedure = Some(record);
                if !active {
                    return Ok(StepOutcome::Inactive);
                }
            },
        }

        self.advance_to(step.outcome())?;
        Ok(StepOutcome::Advanced(self.state))
    }

    fn advance_to(&mut self, next: SessionState) -> Result<()> {
        if next <= self.state {
            return Err(CsError::Protocol(format!(
                "Illegal transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Session snapshot
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session ID
    pub session_id: String,
    /// Link the session ran on
    pub link: LinkId,
    /// Peer address
    pub peer: String,
    /// Local role
    pub role: Role,
    /// State at the time of the snapshot
    pub state: SessionState,
    /// Link security level reached
    pub security_level: Option<SecurityLevel>,
    /// Whether remote capabilities were received
    pub capabilities_known: bool,
    /// Negotiated configuration
    pub config: Option<ConfigRecord>,
    /// Last procedure enable record
    pub procedure: Option<ProcedureEnableRecord>,
    /// Why the link went down
    pub disconnect_reason: Option<DisconnectReason>,
    /// Seconds since connect
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CreateConfigParams, ProcedureParams};

    fn session(role: Role) -> Session {
        Session::new(LinkHandle::new(LinkId(1), "peer"), role, 0)
    }

    fn completion(payload: CompletionPayload, status: HciStatus) -> Completion {
        Completion {
            link: LinkId(1),
            status,
            payload,
        }
    }

    fn ok(payload: CompletionPayload) -> Completion {
        completion(payload, HciStatus::SUCCESS)
    }

    #[test]
    fn test_full_initiator_sequence() {
        let mut s = session(Role::Initiator);
        assert_eq!(s.state(), SessionState::Connected);

        s.begin(Step::Security).unwrap();
        assert_eq!(s.state(), SessionState::Securing);
        s.complete(ok(CompletionPayload::Security(SecurityLevel::L2)))
            .unwrap();
        assert_eq!(s.state(), SessionState::Secured);

        s.begin(Step::Capabilities).unwrap();
        s.complete(ok(CompletionPayload::Capabilities(None))).unwrap();
        assert!(s.capabilities().is_some());

        let record = ConfigRecord::from_params(&CreateConfigParams::pbr_initiator(0), Role::Initiator);
        s.begin(Step::Config).unwrap();
        s.complete(ok(CompletionPayload::Config(Some(record.clone()))))
            .unwrap();
        assert_eq!(s.config(), Some(&record));

        s.begin(Step::SecurityEnable).unwrap();
        s.complete(ok(CompletionPayload::SecurityEnabled)).unwrap();

        s.begin(Step::ProcedureParams).unwrap();
        assert_eq!(
            s.confirm(Step::ProcedureParams).unwrap(),
            SessionState::ProcedureParamsSet
        );

        let enable = ProcedureEnableRecord::selected(&ProcedureParams::initiator(0), 0);
        s.begin(Step::ProcedureEnable).unwrap();
        let outcome = s
            .complete(ok(CompletionPayload::ProcedureEnable(Some(enable))))
            .unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(SessionState::ProcedureEnabled));
    }

    #[test]
    fn test_one_outstanding_request() {
        let mut s = session(Role::Initiator);
        s.begin(Step::Security).unwrap();
        assert!(s.begin(Step::Security).is_err());
        assert_eq!(s.outstanding(), Some(Step::Security));
    }

    #[test]
    fn test_precondition_enforced() {
        let mut s = session(Role::Initiator);
        assert!(s.begin(Step::Config).is_err());
        assert!(s.outstanding().is_none());
    }

    #[test]
    fn test_failure_halts_in_place() {
        let mut s = session(Role::Initiator);
        s.begin(Step::Security).unwrap();
        s.complete(ok(CompletionPayload::Security(SecurityLevel::L2)))
            .unwrap();

        s.begin(Step::Capabilities).unwrap();
        let outcome = s
            .complete(completion(
                CompletionPayload::Capabilities(None),
                HciStatus::UNSUPPORTED_FEATURE,
            ))
            .unwrap();
        assert_eq!(outcome, StepOutcome::Failed(HciStatus::UNSUPPORTED_FEATURE));
        assert_eq!(s.state(), SessionState::Secured);
        assert!(s.outstanding().is_none());
    }

    #[test]
    fn test_unmatched_completion_rejected() {
        let mut s = session(Role::Initiator);
        assert!(s.complete(ok(CompletionPayload::SecurityEnabled)).is_err());
        s.begin(Step::Security).unwrap();
        assert!(s.complete(ok(CompletionPayload::SecurityEnabled)).is_err());
    }

    #[test]
    fn test_terminate_from_any_state() {
        let mut s = session(Role::Initiator);
        s.begin(Step::Security).unwrap();
        s.terminate(DisconnectReason::CONNECTION_TIMEOUT);
        assert!(s.is_terminated());
        assert!(s.outstanding().is_none());
        assert!(s.begin(Step::Security).is_err());
        assert_eq!(
            s.summary().disconnect_reason,
            Some(DisconnectReason::CONNECTION_TIMEOUT)
        );
    }

    #[test]
    fn test_reflector_observes_forward_only() {
        let mut s = session(Role::Reflector);
        let record = ConfigRecord::from_params(&CreateConfigParams::pbr_initiator(0), Role::Reflector);

        let outcome = s.observe(ok(CompletionPayload::Config(Some(record))));
        assert_eq!(outcome, StepOutcome::Advanced(SessionState::ConfigCreation));

        // Capability exchange reported late: never moves backwards.
        assert_eq!(
            s.observe(ok(CompletionPayload::Capabilities(None))),
            StepOutcome::Ignored
        );
        assert_eq!(s.state(), SessionState::ConfigCreation);

        s.begin(Step::ProcedureParams).unwrap();
        s.confirm(Step::ProcedureParams).unwrap();
        assert_eq!(
            s.observe(ok(CompletionPayload::SecurityEnabled)),
            StepOutcome::Ignored
        );
        assert_eq!(s.state(), SessionState::ProcedureParamsSet);
    }

    #[test]
    fn test_disabled_procedures_do_not_advance() {
        let mut s = session(Role::Reflector);
        let record = ConfigRecord::from_params(&CreateConfigParams::pbr_initiator(0), Role::Reflector);
        s.observe(ok(CompletionPayload::Config(Some(record))));
        s.begin(Step::ProcedureParams).unwrap();
        s.confirm(Step::ProcedureParams).unwrap();

        let outcome = s.observe(ok(CompletionPayload::ProcedureEnable(Some(
            ProcedureEnableRecord::disabled(0),
        ))));
        assert_eq!(outcome, StepOutcome::Inactive);
        assert_eq!(s.state(), SessionState::ProcedureParamsSet);
        assert!(!s.procedure().unwrap().is_active());
    }

    #[test]
    fn test_session_ids_unique() {
        assert_ne!(session(Role::Reflector).id(), session(Role::Reflector).id());
    }
}
