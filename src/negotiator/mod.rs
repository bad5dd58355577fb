//! Step driver for one session.
//!
//! A [`Negotiator`] borrows the gateway, the completion slots and the
//! session for the duration of a negotiation. Each directive step is issued
//! once, then the driver suspends on that step's slot until the completion
//! (or link loss) arrives:
//!
//! ```text
//! begin(step) ── request ──> gateway
//!      │                        │ (controller context)
//!      │                        └──> EventDispatcher ──> slot[step]
//!      └── wait_step(step) <──────────────────────────────┘
//!            │
//!            ├─ completion: Session::complete
//!            └─ link loss:  Session::terminate
//! ```
//!
//! Roles differ only in which methods they call and with which parameters.

mod dispatch;

pub use dispatch::{completion_channel, CompletionSlots, EventDispatcher, LinkLoss, SlotEvent};

use crate::error::{CsError, Result};
use crate::gateway::{Gateway, GatewayError, GatewayResult};
use crate::protocol::{
    Completion, CreateConfigParams, CreateContext, DefaultSettings, DisconnectReason, LinkHandle,
    ProcedureParams, SecurityLevel, Session, Step, StepOutcome,
};

/// Drives one [`Session`] through the negotiation steps
pub struct Negotiator<'a, G: ?Sized> {
    gateway: &'a G,
    slots: &'a mut CompletionSlots,
    session: &'a mut Session,
}

impl<'a, G: Gateway + ?Sized> Negotiator<'a, G> {
    /// Create a driver for `session`
    pub fn new(gateway: &'a G, slots: &'a mut CompletionSlots, session: &'a mut Session) -> Self {
        Self {
            gateway,
            slots,
            session,
        }
    }

    /// Session being driven
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Elevate link security to `level`
    pub async fn secure(&mut self, level: SecurityLevel) -> Result<()> {
        self.run_step(Step::Security, |gw, link| gw.set_security(link, level))
            .await
    }

    /// Apply default ranging settings. No completion follows.
    pub async fn apply_default_settings(&mut self, settings: &DefaultSettings) -> Result<()> {
        self.check_link()?;
        if let Err(source) = self
            .gateway
            .set_default_settings(self.session.link(), settings)
        {
            self.link_refusal(&source).await?;
            return Err(CsError::DefaultSettings(source));
        }
        tracing::debug!(
            initiator = settings.enable_initiator_role,
            reflector = settings.enable_reflector_role,
            max_tx_power = settings.max_tx_power,
            "CS default settings applied"
        );
        Ok(())
    }

    /// Read the peer's capabilities
    pub async fn exchange_capabilities(&mut self) -> Result<()> {
        self.run_step(Step::Capabilities, |gw, link| {
            gw.read_remote_capabilities(link)
        })
        .await
    }

    /// Create the configuration described by `params`
    pub async fn create_config(
        &mut self,
        params: &CreateConfigParams,
        context: CreateContext,
    ) -> Result<()> {
        self.run_step(Step::Config, |gw, link| {
            gw.create_config(link, params, context)
        })
        .await
    }

    /// Start CS security
    pub async fn enable_security(&mut self) -> Result<()> {
        self.run_step(Step::SecurityEnable, |gw, link| gw.security_enable(link))
            .await
    }

    /// Set procedure parameters; confirmed as soon as the request is accepted
    pub async fn set_procedure_parameters(&mut self, params: &ProcedureParams) -> Result<()> {
        self.issue(Step::ProcedureParams, |gw, link| {
            gw.set_procedure_parameters(link, params)
        })
        .await?;
        self.session.confirm(Step::ProcedureParams)?;
        tracing::info!(
            config_id = params.config_id,
            min_interval = params.min_procedure_interval,
            max_interval = params.max_procedure_interval,
            min_subevent_len = params.min_subevent_len,
            max_subevent_len = params.max_subevent_len,
            "CS procedure parameters set."
        );
        Ok(())
    }

    /// Enable procedures for the session's configuration
    pub async fn enable_procedures(&mut self) -> Result<()> {
        let config_id = self.session.config_id();
        self.run_step(Step::ProcedureEnable, |gw, link| {
            gw.procedure_enable(link, config_id, true)
        })
        .await
    }

    /// Wait for the peer to create the configuration.
    ///
    /// Other peer-driven completions seen meanwhile are recorded. A failed
    /// config creation is logged and waiting continues.
    pub async fn await_peer_config(&mut self) -> Result<()> {
        loop {
            let completion = self.next_completion().await?;
            let step = completion.step();
            let outcome = self.session.observe(completion);
            self.report(step, outcome);
            if step == Step::Config && matches!(outcome, StepOutcome::Advanced(_)) {
                return Ok(());
            }
        }
    }

    /// Record completions until the link goes down
    pub async fn idle(&mut self) -> Result<DisconnectReason> {
        loop {
            match self.next_completion().await {
                Ok(completion) => {
                    let step = completion.step();
                    let outcome = self.session.observe(completion);
                    self.report(step, outcome);
                },
                Err(CsError::LinkLost(reason)) => return Ok(reason),
                Err(e) => return Err(e),
            }
        }
    }

    async fn issue<F>(&mut self, step: Step, request: F) -> Result<()>
    where
        F: FnOnce(&G, &LinkHandle) -> GatewayResult,
    {
        self.check_link()?;
        self.session.begin(step)?;
        if let Err(source) = request(self.gateway, self.session.link()) {
            self.session.abandon(step);
            self.link_refusal(&source).await?;
            tracing::warn!("Failed to request {step} ({source})");
            return Err(CsError::Request { step, source });
        }
        tracing::debug!(session = %self.session.id(), "Requested {step}");
        Ok(())
    }

    /// Fail with `LinkLost` if the link already went down
    fn check_link(&mut self) -> Result<()> {
        match self.slots.pending_loss(self.session.link().id()) {
            Some(loss) => Err(self.lost(loss)),
            None => Ok(()),
        }
    }

    /// Classify a refused request: a refusal caused by link loss becomes
    /// `LinkLost`. `NotConnected` waits for the disconnect event, which the
    /// stack may deliver after refusing.
    async fn link_refusal(&mut self, source: &GatewayError) -> Result<()> {
        let link = self.session.link().id();
        let loss = match source {
            GatewayError::NotConnected => self.slots.wait_loss(link).await,
            _ => self.slots.pending_loss(link),
        };
        match loss {
            Some(loss) => Err(self.lost(loss)),
            None if *source == GatewayError::NotConnected => Err(CsError::EventsClosed),
            None => Ok(()),
        }
    }

    fn lost(&mut self, loss: LinkLoss) -> CsError {
        self.session.terminate(loss.reason);
        CsError::LinkLost(loss.reason)
    }

    async fn run_step<F>(&mut self, step: Step, request: F) -> Result<()>
    where
        F: FnOnce(&G, &LinkHandle) -> GatewayResult,
    {
        self.issue(step, request).await?;
        let completion = self.wait_completion(step).await?;
        let outcome = self.session.complete(completion)?;
        self.report(step, outcome);

        match outcome {
            StepOutcome::Advanced(_) | StepOutcome::Ignored => Ok(()),
            StepOutcome::Failed(status) => Err(CsError::StepFailed { step, status }),
            StepOutcome::Inactive => Err(CsError::ProceduresInactive),
        }
    }

    async fn wait_completion(&mut self, step: Step) -> Result<Completion> {
        let link = self.session.link().id();
        loop {
            match self.slots.wait_step(step).await {
                None => return Err(CsError::EventsClosed),
                Some(SlotEvent::LinkLost(loss)) if loss.link == link => {
                    return Err(self.lost(loss));
                },
                Some(SlotEvent::LinkLost(loss)) => {
                    tracing::debug!("Ignoring link loss on {}", loss.link);
                },
                Some(SlotEvent::Completion(c)) if c.link == link => return Ok(c),
                Some(SlotEvent::Completion(c)) => {
                    tracing::debug!("Ignoring {} completion for {}", c.step(), c.link);
                },
            }
        }
    }

    async fn next_completion(&mut self) -> Result<Completion> {
        let link = self.session.link().id();
        loop {
            match self.slots.wait_any().await {
                None => return Err(CsError::EventsClosed),
                Some(SlotEvent::LinkLost(loss)) if loss.link == link => {
                    return Err(self.lost(loss));
                },
                Some(SlotEvent::Completion(c)) if c.link == link => return Ok(c),
                Some(_) => {},
            }
        }
    }

    fn report(&self, step: Step, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Failed(status) => {
                tracing::warn!("CS {step} failed. (HCI status {status})");
            },
            StepOutcome::Inactive => tracing::info!("CS procedures disabled."),
            StepOutcome::Ignored => {
                tracing::debug!(state = ?self.session.state(), "{step} completion ignored");
            },
            StepOutcome::Advanced(state) => {
                tracing::debug!(session = %self.session.id(), ?state, "Session advanced");
                self.announce(step);
            },
        }
    }

    fn announce(&self, step: Step) {
        match step {
            Step::Security => tracing::info!("Security changed."),
            Step::Capabilities => tracing::info!("CS capability exchange completed."),
            Step::Config => {
                if let Some(config) = self.session.config() {
                    tracing::info!(
                        id = config.id,
                        mode = %config.mode,
                        min_main_mode_steps = config.min_main_mode_steps,
                        max_main_mode_steps = config.max_main_mode_steps,
                        main_mode_repetition = config.main_mode_repetition,
                        mode_0_steps = config.mode_0_steps,
                        role = %config.role,
                        rtt_type = config.rtt_type.code(),
                        cs_sync_phy = config.cs_sync_phy.code(),
                        channel_map_repetition = config.channel_map_repetition,
                        channel_selection_type = config.channel_selection_type.code(),
                        ch3c_shape = config.ch3c_shape.code(),
                        ch3c_jump = config.ch3c_jump,
                        channel_map = %config.channel_map,
                        "CS config creation complete."
                    );
                }
            },
            Step::SecurityEnable => tracing::info!("CS security enabled."),
            Step::ProcedureParams => {},
            Step::ProcedureEnable => {
                if let Some(record) = self.session.procedure() {
                    tracing::info!(
                        config_id = record.config_id,
                        tone_antenna_config_selection = record.tone_antenna_config_selection,
                        selected_tx_power = record.selected_tx_power,
                        subevent_len = record.subevent_len,
                        subevents_per_event = record.subevents_per_event,
                        subevent_interval = record.subevent_interval,
                        event_interval = record.event_interval,
                        procedure_interval = record.procedure_interval,
                        procedure_count = record.procedure_count,
                        max_procedure_len = record.max_procedure_len,
                        "CS procedures enabled:"
                    );
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::gateway::{GatewayError, LinkGateway, RangingGateway, SecurityGateway};
    use crate::protocol::{
        ConfigRecord, HciStatus, LinkId, ProcedureEnableRecord, RangingEvents, Role,
        SessionState,
    };
    use crate::telemetry::Reporter;

    /// Answers every request synchronously through the dispatcher
    struct EchoGateway {
        events: EventDispatcher,
        requests: Mutex<Vec<&'static str>>,
        fail_capabilities: bool,
        refuse_config: bool,
        drop_on_params: bool,
    }

    impl EchoGateway {
        fn log(&self, what: &'static str) {
            self.requests.lock().unwrap().push(what);
        }
    }

    impl LinkGateway for EchoGateway {
        fn enable(&self) -> GatewayResult {
            Ok(())
        }
        fn start_scan(&self) -> GatewayResult {
            Ok(())
        }
        fn start_advertising(&self) -> GatewayResult {
            Ok(())
        }
    }

    impl SecurityGateway for EchoGateway {
        fn set_security(&self, link: &LinkHandle, level: SecurityLevel) -> GatewayResult {
            self.log("security");
            self.events
                .security_changed(link.id(), level, HciStatus::SUCCESS);
            Ok(())
        }
    }

    impl RangingGateway for EchoGateway {
        fn set_default_settings(&self, _: &LinkHandle, _: &DefaultSettings) -> GatewayResult {
            self.log("defaults");
            Ok(())
        }
        fn read_remote_capabilities(&self, link: &LinkHandle) -> GatewayResult {
            self.log("capabilities");
            let status = if self.fail_capabilities {
                HciStatus::UNSUPPORTED_FEATURE
            } else {
                HciStatus::SUCCESS
            };
            self.events.remote_capabilities(link.id(), status, None);
            Ok(())
        }
        fn create_config(
            &self,
            link: &LinkHandle,
            params: &CreateConfigParams,
            _: CreateContext,
        ) -> GatewayResult {
            self.log("config");
            if self.refuse_config {
                return Err(GatewayError::Rejected(-5));
            }
            self.events.config_created(
                link.id(),
                HciStatus::SUCCESS,
                Some(ConfigRecord::from_params(params, params.role)),
            );
            Ok(())
        }
        fn security_enable(&self, link: &LinkHandle) -> GatewayResult {
            self.log("security_enable");
            self.events.security_enabled(link.id(), HciStatus::SUCCESS);
            Ok(())
        }
        fn set_procedure_parameters(&self, link: &LinkHandle, _: &ProcedureParams) -> GatewayResult {
            self.log("procedure_params");
            if self.drop_on_params {
                self.events
                    .disconnected(link.id(), DisconnectReason::CONNECTION_TIMEOUT);
                return Err(GatewayError::NotConnected);
            }
            Ok(())
        }
        fn procedure_enable(&self, link: &LinkHandle, config_id: u8, _: bool) -> GatewayResult {
            self.log("procedure_enable");
            self.events.procedure_enabled(
                link.id(),
                HciStatus::SUCCESS,
                Some(ProcedureEnableRecord::selected(
                    &ProcedureParams::initiator(config_id),
                    0,
                )),
            );
            Ok(())
        }
    }

    fn setup(fail_capabilities: bool, refuse_config: bool) -> (EchoGateway, CompletionSlots, Session) {
        let (events, slots) = completion_channel(Arc::new(Reporter::new()));
        let gateway = EchoGateway {
            events,
            requests: Mutex::new(Vec::new()),
            fail_capabilities,
            refuse_config,
            drop_on_params: false,
        };
        let session = Session::new(LinkHandle::new(LinkId(1), "peer"), Role::Initiator, 0);
        (gateway, slots, session)
    }

    #[tokio::test]
    async fn test_drives_full_sequence() {
        let (gateway, mut slots, mut session) = setup(false, false);
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);

        negotiator.secure(SecurityLevel::L2).await.unwrap();
        negotiator
            .apply_default_settings(&DefaultSettings::for_role(Role::Initiator))
            .await
            .unwrap();
        negotiator.exchange_capabilities().await.unwrap();
        negotiator
            .create_config(
                &CreateConfigParams::pbr_initiator(0),
                CreateContext::LocalAndRemote,
            )
            .await
            .unwrap();
        negotiator.enable_security().await.unwrap();
        negotiator
            .set_procedure_parameters(&ProcedureParams::initiator(0))
            .await
            .unwrap();
        negotiator.enable_procedures().await.unwrap();

        assert_eq!(session.state(), SessionState::ProcedureEnabled);
        assert_eq!(
            *gateway.requests.lock().unwrap(),
            vec![
                "security",
                "defaults",
                "capabilities",
                "config",
                "security_enable",
                "procedure_params",
                "procedure_enable"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_completion_halts() {
        let (gateway, mut slots, mut session) = setup(true, false);
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);

        negotiator.secure(SecurityLevel::L2).await.unwrap();
        let err = negotiator.exchange_capabilities().await.unwrap_err();
        assert!(matches!(
            err,
            CsError::StepFailed {
                step: Step::Capabilities,
                status: HciStatus::UNSUPPORTED_FEATURE
            }
        ));
        assert_eq!(session.state(), SessionState::Secured);
    }

    #[tokio::test]
    async fn test_refused_request_is_step_failure() {
        let (gateway, mut slots, mut session) = setup(false, true);
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);

        negotiator.secure(SecurityLevel::L2).await.unwrap();
        negotiator.exchange_capabilities().await.unwrap();
        let err = negotiator
            .create_config(
                &CreateConfigParams::pbr_initiator(0),
                CreateContext::LocalAndRemote,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CsError::Request { step: Step::Config, .. }));
        assert!(session.outstanding().is_none());
        assert_eq!(session.state(), SessionState::CapabilityExchange);
    }

    #[tokio::test]
    async fn test_link_loss_terminates_pending_step() {
        let (gateway, mut slots, mut session) = setup(false, false);
        gateway
            .events
            .disconnected(LinkId(1), DisconnectReason::CONNECTION_TIMEOUT);
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);

        let err = negotiator.secure(SecurityLevel::L2).await.unwrap_err();
        assert!(err.is_link_loss());
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_other_link_completions_ignored() {
        let (gateway, mut slots, mut session) = setup(false, false);
        gateway.events.config_created(LinkId(9), HciStatus::SUCCESS, None);
        gateway
            .events
            .disconnected(LinkId(1), DisconnectReason::REMOTE_USER_TERMINATED);
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);

        let reason = negotiator.idle().await.unwrap();
        assert_eq!(reason, DisconnectReason::REMOTE_USER_TERMINATED);
        assert!(session.config().is_none());
        assert!(session.is_terminated());
    }

    #[tokio::test]
    async fn test_refusal_after_link_loss_terminates() {
        let (mut gateway, mut slots, mut session) = setup(false, false);
        gateway.drop_on_params = true;
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);

        negotiator.secure(SecurityLevel::L2).await.unwrap();
        negotiator.exchange_capabilities().await.unwrap();
        negotiator
            .create_config(
                &CreateConfigParams::pbr_initiator(0),
                CreateContext::LocalAndRemote,
            )
            .await
            .unwrap();
        negotiator.enable_security().await.unwrap();
        let err = negotiator
            .set_procedure_parameters(&ProcedureParams::initiator(0))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CsError::LinkLost(DisconnectReason::CONNECTION_TIMEOUT)
        ));
        assert!(session.is_terminated());
        assert!(session.outstanding().is_none());
        assert_eq!(slots.drain(), 0);
    }

    #[tokio::test]
    async fn test_loss_between_steps_stops_next_request() {
        let (gateway, mut slots, mut session) = setup(false, false);
        let mut negotiator = Negotiator::new(&gateway, &mut slots, &mut session);
        negotiator.secure(SecurityLevel::L2).await.unwrap();

        gateway
            .events
            .disconnected(LinkId(1), DisconnectReason::REMOTE_USER_TERMINATED);
        let err = negotiator
            .apply_default_settings(&DefaultSettings::for_role(Role::Initiator))
            .await
            .unwrap_err();

        assert!(err.is_link_loss());
        assert!(session.is_terminated());
        assert_eq!(*gateway.requests.lock().unwrap(), vec!["security"]);
    }
}
