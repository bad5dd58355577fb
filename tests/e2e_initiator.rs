//! End-to-end initiator tests against the simulated controller.
//!
//! These tests verify step ordering, failure handling and link-loss
//! recovery beyond the unit test level.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cs_ranging::host::{InProcessRestart, Supervisor};
use cs_ranging::negotiator::{completion_channel, CompletionSlots};
use cs_ranging::protocol::{
    DisconnectReason, HciStatus, MainMode, Role, SessionState, Step,
};
use cs_ranging::role::{Initiator, RoleProfile};
use cs_ranging::sim::{Request, SimController, SimScript};
use cs_ranging::telemetry::Reporter;
use cs_ranging::CsError;

const ALL_STEPS: [Step; 6] = [
    Step::Security,
    Step::Capabilities,
    Step::Config,
    Step::SecurityEnable,
    Step::ProcedureParams,
    Step::ProcedureEnable,
];

struct Harness {
    sim: Arc<SimController>,
    slots: CompletionSlots,
    restart: Arc<InProcessRestart>,
    reporter: Arc<Reporter>,
}

fn harness(script: SimScript) -> Harness {
    let reporter = Arc::new(Reporter::new());
    let (events, slots) = completion_channel(Arc::clone(&reporter));
    let sim = Arc::new(SimController::new(Role::Initiator, script, Arc::new(events)));
    Harness {
        sim,
        slots,
        restart: Arc::new(InProcessRestart::new()),
        reporter,
    }
}

impl Harness {
    fn initiator(self) -> (Initiator<SimController>, Arc<SimController>, Arc<InProcessRestart>, Arc<Reporter>) {
        let initiator = Initiator::new(
            RoleProfile::initiator(0),
            Arc::clone(&self.sim),
            self.slots,
            self.restart.clone(),
        );
        (initiator, self.sim, self.restart, self.reporter)
    }
}

async fn bounded<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("scenario stalled")
}

/// Test the complete sequence runs in order and ends on link loss
#[tokio::test]
async fn test_full_negotiation_in_order() {
    let (mut initiator, sim, restart, reporter) = harness(SimScript::default()).initiator();

    let end = bounded(initiator.run()).await.unwrap();

    assert_eq!(sim.requested_steps(), ALL_STEPS.to_vec());
    assert_eq!(end.summary.state, SessionState::Terminated);
    assert_eq!(end.reason, DisconnectReason::REMOTE_USER_TERMINATED);
    assert_eq!(restart.count(), 1);
    assert_eq!(reporter.reported(), 4);

    let procedure = end.summary.procedure.expect("procedure record");
    assert!(procedure.is_active());
    assert_eq!(procedure.procedure_interval, 10);
}

/// Test the stored config record matches the requested PBR configuration
#[tokio::test]
async fn test_config_record_matches_request() {
    let (mut initiator, _sim, _restart, _reporter) = harness(SimScript::default()).initiator();

    let end = bounded(initiator.run()).await.unwrap();

    let config = end.summary.config.expect("config record");
    assert_eq!(config.id, 0);
    assert_eq!(config.mode, MainMode::Pbr);
    assert_eq!(config.min_main_mode_steps, 2);
    assert_eq!(config.max_main_mode_steps, 5);
    assert_eq!(config.mode_0_steps, 3);
    assert_eq!(config.role, Role::Initiator);
}

/// Test the create-config request carries the initiator parameters
#[tokio::test]
async fn test_create_config_request_parameters() {
    let (mut initiator, sim, _restart, _reporter) = harness(SimScript::default()).initiator();
    bounded(initiator.run()).await.unwrap();

    let params = sim
        .requests()
        .into_iter()
        .find_map(|r| match r {
            Request::CreateConfig(_, params, _) => Some(params),
            _ => None,
        })
        .expect("create config request");
    assert_eq!(params.channel_map.count(), 72);
    assert_eq!(params.ch3c_jump, 2);
}

/// Test a capability-exchange failure halts at Secured without config creation
#[tokio::test]
async fn test_capability_failure_halts_at_secured() {
    let script = SimScript::default().failing(Step::Capabilities, HciStatus::UNSUPPORTED_FEATURE);
    let (mut initiator, sim, restart, _reporter) = harness(script).initiator();

    let mut session = bounded(initiator.connect()).await.unwrap();
    let err = bounded(initiator.negotiate(&mut session)).await.unwrap_err();

    assert!(matches!(
        err,
        CsError::StepFailed {
            step: Step::Capabilities,
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Secured);
    assert_eq!(sim.requested_steps(), vec![Step::Security, Step::Capabilities]);
    assert_eq!(restart.count(), 0);
}

/// Test every step failure is fatal to the initiator
#[tokio::test]
async fn test_step_failures_are_fatal() {
    for step in [Step::Security, Step::Config, Step::SecurityEnable, Step::ProcedureEnable] {
        let script = SimScript::default().failing(step, HciStatus::UNSPECIFIED);
        let (mut initiator, sim, _restart, _reporter) = harness(script).initiator();

        let err = bounded(initiator.run()).await.unwrap_err();
        assert!(
            matches!(err, CsError::StepFailed { step: failed, .. } if failed == step),
            "{step}: {err}"
        );
        assert_eq!(sim.requested_steps().last(), Some(&step));
    }
}

/// Test a refused request is a step failure and nothing else is requested
#[tokio::test]
async fn test_refused_request_is_fatal() {
    let script = SimScript::default().refusing(Step::Config, -22);
    let (mut initiator, sim, restart, _reporter) = harness(script).initiator();

    let err = bounded(initiator.run()).await.unwrap_err();

    assert!(matches!(err, CsError::Request { step: Step::Config, .. }));
    assert_eq!(sim.requested_steps().last(), Some(&Step::Config));
    assert_eq!(restart.count(), 0);
}

/// Test procedures reported disabled do not count as enabled
#[tokio::test]
async fn test_disabled_procedures_reported() {
    let script = SimScript {
        procedures_disabled: true,
        ..Default::default()
    };
    let (mut initiator, _sim, _restart, reporter) = harness(script).initiator();

    let err = bounded(initiator.run()).await.unwrap_err();
    assert!(matches!(err, CsError::ProceduresInactive));
    assert_eq!(reporter.reported(), 0);
}

/// Test link loss at any step terminates the session and restarts exactly once
#[tokio::test]
async fn test_link_loss_at_every_step() {
    for (index, step) in ALL_STEPS.iter().copied().enumerate() {
        let script = SimScript::default().dropping_at(step);
        let (mut initiator, sim, restart, reporter) = harness(script).initiator();

        let end = bounded(initiator.run()).await.unwrap();

        assert_eq!(end.summary.state, SessionState::Terminated, "{step}");
        assert_eq!(restart.count(), 1, "{step}");
        assert_eq!(reporter.reported(), 0, "{step}");
        let requested = sim.requested_steps();
        assert_eq!(&requested[..=index], &ALL_STEPS[..=index], "{step}");
    }
}

/// Test the supervisor builds a fresh session for every connection
#[tokio::test]
async fn test_supervisor_restarts_with_fresh_state() {
    let script = SimScript {
        connections: 2,
        results_per_connection: 2,
        ..Default::default()
    };
    let Harness {
        sim,
        slots,
        restart,
        reporter,
    } = harness(script);

    let supervisor = Supervisor::new(RoleProfile::initiator(0), Arc::clone(&sim), restart.clone())
        .with_max_sessions(Some(2));
    let ended = bounded(supervisor.run(slots)).await.unwrap();

    assert_eq!(ended.len(), 2);
    assert_ne!(ended[0].summary.session_id, ended[1].summary.session_id);
    assert_ne!(ended[0].summary.link, ended[1].summary.link);
    assert!(ended
        .iter()
        .all(|end| end.summary.state == SessionState::Terminated));
    assert_eq!(restart.count(), 2);
    assert_eq!(reporter.reported(), 4);
    assert_eq!(sim.requested_steps().len(), 2 * ALL_STEPS.len());
}

mod late_disconnect {
    use super::*;
    use cs_ranging::gateway::{
        GatewayError, GatewayResult, LinkGateway, RangingGateway, SecurityGateway,
    };
    use cs_ranging::negotiator::EventDispatcher;
    use cs_ranging::protocol::{
        CreateConfigParams, CreateContext, DefaultSettings, LinkHandle, ProcedureParams,
        RangingEvents, SecurityLevel,
    };

    /// Refuses one step with `NotConnected`, then reports the disconnect late
    struct LateDisconnect {
        sim: Arc<SimController>,
        events: Arc<EventDispatcher>,
        refuse_at: Step,
    }

    impl LateDisconnect {
        fn refuse(&self, step: Step, link: &LinkHandle) -> Option<GatewayResult> {
            if step != self.refuse_at {
                return None;
            }
            let events = Arc::clone(&self.events);
            let id = link.id();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                events.disconnected(id, DisconnectReason::CONNECTION_TIMEOUT);
            });
            Some(Err(GatewayError::NotConnected))
        }
    }

    impl LinkGateway for LateDisconnect {
        fn enable(&self) -> GatewayResult {
            self.sim.enable()
        }
        fn start_scan(&self) -> GatewayResult {
            self.sim.start_scan()
        }
        fn start_advertising(&self) -> GatewayResult {
            self.sim.start_advertising()
        }
    }

    impl SecurityGateway for LateDisconnect {
        fn set_security(&self, link: &LinkHandle, level: SecurityLevel) -> GatewayResult {
            self.refuse(Step::Security, link)
                .unwrap_or_else(|| self.sim.set_security(link, level))
        }
    }

    impl RangingGateway for LateDisconnect {
        fn set_default_settings(&self, link: &LinkHandle, settings: &DefaultSettings) -> GatewayResult {
            self.sim.set_default_settings(link, settings)
        }
        fn read_remote_capabilities(&self, link: &LinkHandle) -> GatewayResult {
            self.refuse(Step::Capabilities, link)
                .unwrap_or_else(|| self.sim.read_remote_capabilities(link))
        }
        fn create_config(
            &self,
            link: &LinkHandle,
            params: &CreateConfigParams,
            context: CreateContext,
        ) -> GatewayResult {
            self.refuse(Step::Config, link)
                .unwrap_or_else(|| self.sim.create_config(link, params, context))
        }
        fn security_enable(&self, link: &LinkHandle) -> GatewayResult {
            self.refuse(Step::SecurityEnable, link)
                .unwrap_or_else(|| self.sim.security_enable(link))
        }
        fn set_procedure_parameters(&self, link: &LinkHandle, params: &ProcedureParams) -> GatewayResult {
            self.refuse(Step::ProcedureParams, link)
                .unwrap_or_else(|| self.sim.set_procedure_parameters(link, params))
        }
        fn procedure_enable(&self, link: &LinkHandle, config_id: u8, enable: bool) -> GatewayResult {
            self.refuse(Step::ProcedureEnable, link)
                .unwrap_or_else(|| self.sim.procedure_enable(link, config_id, enable))
        }
    }

    /// Test a request refused because the link just dropped ends the session
    /// through recovery, with the disconnect reported after the refusal
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refusal_on_dropped_link_recovers() {
        for step in ALL_STEPS {
            let (events, slots) = completion_channel(Arc::new(Reporter::new()));
            let events = Arc::new(events);
            let sim = Arc::new(SimController::new(
                Role::Initiator,
                SimScript::default(),
                events.clone(),
            ));
            let gateway = Arc::new(LateDisconnect {
                sim,
                events,
                refuse_at: step,
            });
            let restart = Arc::new(InProcessRestart::new());
            let mut initiator =
                Initiator::new(RoleProfile::initiator(0), gateway, slots, restart.clone());

            let end = bounded(initiator.run()).await.unwrap();

            assert_eq!(end.summary.state, SessionState::Terminated, "{step}");
            assert_eq!(end.reason, DisconnectReason::CONNECTION_TIMEOUT, "{step}");
            assert_eq!(restart.count(), 1, "{step}");
        }
    }
}
