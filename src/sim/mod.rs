//! Scripted in-process controller.
//!
//! [`SimController`] stands in for the link stack, the security layer and
//! the ranging controller together. Requests are recorded and answered from
//! spawned tokio tasks, so events reach [`RangingEvents`] from a separate
//! execution context, as they would from a real controller.
//!
//! Against a local initiator the simulator answers each request. Against a
//! local reflector it also plays the remote initiator, driving security,
//! capability exchange, config creation and CS security after connecting.

mod script;

pub use script::SimScript;

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use crate::gateway::{
    GatewayError, GatewayResult, LinkGateway, RangingGateway, SecurityGateway,
};
use crate::protocol::{
    CapabilitySnapshot, ConfigRecord, CreateConfigParams, CreateContext, DefaultSettings,
    HciStatus, LinkHandle, LinkId, ProcedureEnableRecord, ProcedureParams, RangingEvents, Role,
    SecurityLevel, Step, CS_CONFIG_ID,
};
use crate::telemetry::{SubeventResult, STEP_HEADER_LEN, TONE_LEN};

/// A request as the simulator received it
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Stack enable
    Enable,
    /// Scan start
    Scan,
    /// Advertising start
    Advertise,
    /// Security elevation
    SetSecurity(LinkId, SecurityLevel),
    /// Default settings
    DefaultSettings(LinkId, DefaultSettings),
    /// Capability read
    ReadCapabilities(LinkId),
    /// Config creation
    CreateConfig(LinkId, CreateConfigParams, CreateContext),
    /// CS security enable
    SecurityEnable(LinkId),
    /// Procedure parameters
    ProcedureParams(LinkId, ProcedureParams),
    /// Procedure enable/disable
    ProcedureEnable(LinkId, u8, bool),
}

impl Request {
    /// Negotiation step the request belongs to
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::SetSecurity(..) => Some(Step::Security),
            Self::ReadCapabilities(_) => Some(Step::Capabilities),
            Self::CreateConfig(..) => Some(Step::Config),
            Self::SecurityEnable(_) => Some(Step::SecurityEnable),
            Self::ProcedureParams(..) => Some(Step::ProcedureParams),
            Self::ProcedureEnable(..) => Some(Step::ProcedureEnable),
            Self::Enable | Self::Scan | Self::Advertise | Self::DefaultSettings(..) => None,
        }
    }
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated link stack and ranging controller
pub struct SimController {
    role: Role,
    script: Arc<SimScript>,
    events: Arc<dyn RangingEvents>,
    requests: Mutex<Vec<Request>>,
    current: Shared<Option<LinkId>>,
    next_link: AtomicU16,
    offered: AtomicU32,
}

impl SimController {
    /// Simulate the environment of a local `role`
    pub fn new(role: Role, script: SimScript, events: Arc<dyn RangingEvents>) -> Self {
        Self {
            role,
            script: Arc::new(script),
            events,
            requests: Mutex::new(Vec::new()),
            current: Arc::new(Mutex::new(None)),
            next_link: AtomicU16::new(1),
            offered: AtomicU32::new(0),
        }
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Steps requested, in order
    pub fn requested_steps(&self) -> Vec<Step> {
        lock(&self.requests).iter().filter_map(Request::step).collect()
    }

    /// Connections handed out so far
    pub fn connections_offered(&self) -> u32 {
        self.offered.load(Ordering::SeqCst)
    }

    /// Currently connected link
    pub fn current_link(&self) -> Option<LinkId> {
        *lock(&self.current)
    }

    fn record(&self, request: Request) {
        tracing::trace!(?request, "sim request");
        lock(&self.requests).push(request);
    }

    fn check(&self, step: Step, link: &LinkHandle) -> GatewayResult {
        if let Some(code) = self.script.refusal(step) {
            return Err(GatewayError::Rejected(code));
        }
        if self.current_link() != Some(link.id()) {
            return Err(GatewayError::NotConnected);
        }
        Ok(())
    }

    fn spawn<F>(&self, deliver: F)
    where
        F: FnOnce(Episode) + Send + 'static,
    {
        let episode = self.episode();
        tokio::spawn(async move {
            episode.pause().await;
            deliver(episode);
        });
    }

    fn episode(&self) -> Episode {
        Episode {
            script: Arc::clone(&self.script),
            events: Arc::clone(&self.events),
            current: Arc::clone(&self.current),
        }
    }

    /// Answer `step` on `link`, or drop the link if scripted to
    fn answer<F>(&self, step: Step, link: LinkId, complete: F)
    where
        F: FnOnce(&Episode) + Send + 'static,
    {
        self.spawn(move |episode| {
            if episode.script.drops_at(step) {
                episode.disconnect(link);
            } else {
                complete(&episode);
            }
        });
    }

    fn offer_connection(&self) -> Option<LinkHandle> {
        let offered = self.offered.fetch_add(1, Ordering::SeqCst);
        if offered >= self.script.connections {
            self.offered.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("sim: no further peers");
            return None;
        }
        let id = LinkId(self.next_link.fetch_add(1, Ordering::SeqCst));
        Some(LinkHandle::new(id, self.script.peer.clone()))
    }
}

/// Everything a delivery task needs
struct Episode {
    script: Arc<SimScript>,
    events: Arc<dyn RangingEvents>,
    current: Shared<Option<LinkId>>,
}

impl Episode {
    async fn pause(&self) {
        if self.script.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.script.latency_ms)).await;
        }
    }

    fn connect(&self, link: LinkHandle) {
        *lock(&self.current) = Some(link.id());
        self.events.connected(link, HciStatus::SUCCESS);
    }

    fn is_current(&self, link: LinkId) -> bool {
        *lock(&self.current) == Some(link)
    }

    fn disconnect(&self, link: LinkId) {
        {
            let mut current = lock(&self.current);
            if *current != Some(link) {
                return;
            }
            *current = None;
        }
        self.events.disconnected(link, self.script.reason());
    }

    fn capabilities(&self, link: LinkId) {
        let status = self.script.status(Step::Capabilities);
        let caps = status.is_success().then(CapabilitySnapshot::default);
        self.events.remote_capabilities(link, status, caps);
    }

    fn config(&self, link: LinkId, params: &CreateConfigParams, local: Role) {
        let status = self.script.status(Step::Config);
        let record = status
            .is_success()
            .then(|| ConfigRecord::from_params(params, local));
        self.events.config_created(link, status, record);
    }

    /// Procedure enable, then the result stream
    async fn procedures(&self, link: LinkId, params: &ProcedureParams) {
        let status = self.script.status(Step::ProcedureEnable);
        let record = if self.script.procedures_disabled {
            ProcedureEnableRecord::disabled(params.config_id)
        } else {
            ProcedureEnableRecord::selected(params, 0)
        };
        let active = status.is_success() && record.is_active();
        self.events.procedure_enabled(link, status, Some(record));
        if !active {
            return;
        }

        for counter in 0..self.script.results_per_connection {
            self.pause().await;
            if !self.is_current(link) {
                return;
            }
            self.events
                .subevent_result(link, synthetic_result(counter, self.script.step_data_len));
        }
        if self.script.disconnect_after_results {
            self.pause().await;
            self.disconnect(link);
        }
    }
}

/// Mode-2 step frames carrying two tones each, cut to `len`
fn synthetic_result(counter: u32, len: usize) -> SubeventResult {
    const PAYLOAD: usize = 1 + 2 * TONE_LEN;
    let data: Vec<u8> = (0..len)
        .map(|i| {
            let step = i / (STEP_HEADER_LEN + PAYLOAD);
            match i % (STEP_HEADER_LEN + PAYLOAD) {
                0 => 0x02,
                1 => 2 + (step % 70) as u8,
                2 => PAYLOAD as u8,
                // antenna permutation index
                3 => 0,
                // tone quality: high, no extension slot
                n if (n - STEP_HEADER_LEN) % TONE_LEN == 0 => 0x00,
                n => (counter as u8).wrapping_add(n as u8),
            }
        })
        .collect();

    SubeventResult {
        procedure_counter: counter as u16,
        reference_power_level: -16,
        num_antenna_paths: 1,
        num_steps_reported: (len / (STEP_HEADER_LEN + PAYLOAD)) as u8,
        step_data: (!data.is_empty()).then(|| Bytes::from(data)),
        ..Default::default()
    }
}

impl LinkGateway for SimController {
    fn enable(&self) -> GatewayResult {
        self.record(Request::Enable);
        Ok(())
    }

    fn start_scan(&self) -> GatewayResult {
        self.record(Request::Scan);
        if let Some(link) = self.offer_connection() {
            self.spawn(move |episode| episode.connect(link));
        }
        Ok(())
    }

    fn start_advertising(&self) -> GatewayResult {
        self.record(Request::Advertise);
        let Some(link) = self.offer_connection() else {
            return Ok(());
        };

        // Play the remote initiator up to CS security.
        let episode = self.episode();
        tokio::spawn(async move {
            let id = link.id();
            episode.pause().await;
            episode.connect(link);

            let peer_config = CreateConfigParams::pbr_initiator(CS_CONFIG_ID);
            for step in [
                Step::Security,
                Step::Capabilities,
                Step::Config,
                Step::SecurityEnable,
            ] {
                episode.pause().await;
                if episode.script.drops_at(step) {
                    episode.disconnect(id);
                    return;
                }
                match step {
                    Step::Security => episode.events.security_changed(
                        id,
                        SecurityLevel::L2,
                        episode.script.status(step),
                    ),
                    Step::Capabilities => episode.capabilities(id),
                    Step::Config => episode.config(id, &peer_config, Role::Reflector),
                    _ => episode
                        .events
                        .security_enabled(id, episode.script.status(step)),
                }
                if !episode.script.status(step).is_success() {
                    // The remote initiator gives up and drops the link.
                    episode.pause().await;
                    episode.disconnect(id);
                    return;
                }
            }
        });
        Ok(())
    }
}

impl SecurityGateway for SimController {
    fn set_security(&self, link: &LinkHandle, level: SecurityLevel) -> GatewayResult {
        self.record(Request::SetSecurity(link.id(), level));
        self.check(Step::Security, link)?;
        let id = link.id();
        self.answer(Step::Security, id, move |episode| {
            episode
                .events
                .security_changed(id, level, episode.script.status(Step::Security));
        });
        Ok(())
    }
}

impl RangingGateway for SimController {
    fn set_default_settings(&self, link: &LinkHandle, settings: &DefaultSettings) -> GatewayResult {
        self.record(Request::DefaultSettings(link.id(), settings.clone()));
        if self.current_link() != Some(link.id()) {
            return Err(GatewayError::NotConnected);
        }
        Ok(())
    }

    fn read_remote_capabilities(&self, link: &LinkHandle) -> GatewayResult {
        self.record(Request::ReadCapabilities(link.id()));
        self.check(Step::Capabilities, link)?;
        let id = link.id();
        self.answer(Step::Capabilities, id, move |episode| episode.capabilities(id));
        Ok(())
    }

    fn create_config(
        &self,
        link: &LinkHandle,
        params: &CreateConfigParams,
        context: CreateContext,
    ) -> GatewayResult {
        self.record(Request::CreateConfig(link.id(), params.clone(), context));
        self.check(Step::Config, link)?;
        let id = link.id();
        let params = params.clone();
        let local = self.role;
        self.answer(Step::Config, id, move |episode| {
            episode.config(id, &params, local);
        });
        Ok(())
    }

    fn security_enable(&self, link: &LinkHandle) -> GatewayResult {
        self.record(Request::SecurityEnable(link.id()));
        self.check(Step::SecurityEnable, link)?;
        let id = link.id();
        self.answer(Step::SecurityEnable, id, move |episode| {
            episode
                .events
                .security_enabled(id, episode.script.status(Step::SecurityEnable));
        });
        Ok(())
    }

    fn set_procedure_parameters(&self, link: &LinkHandle, params: &ProcedureParams) -> GatewayResult {
        self.record(Request::ProcedureParams(link.id(), params.clone()));
        self.check(Step::ProcedureParams, link)?;
        let id = link.id();

        if self.script.drops_at(Step::ProcedureParams) {
            self.spawn(move |episode| episode.disconnect(id));
            return Ok(());
        }
        if self.role == Role::Reflector {
            // The remote initiator enables procedures once both sides are set.
            let params = params.clone();
            let episode = self.episode();
            tokio::spawn(async move {
                episode.pause().await;
                if episode.script.drops_at(Step::ProcedureEnable) {
                    episode.disconnect(id);
                } else {
                    episode.procedures(id, &params).await;
                }
            });
        }
        Ok(())
    }

    fn procedure_enable(&self, link: &LinkHandle, config_id: u8, enable: bool) -> GatewayResult {
        self.record(Request::ProcedureEnable(link.id(), config_id, enable));
        self.check(Step::ProcedureEnable, link)?;
        let id = link.id();
        let params = lock(&self.requests)
            .iter()
            .rev()
            .find_map(|r| match r {
                Request::ProcedureParams(l, p) if *l == id => Some(p.clone()),
                _ => None,
            })
            .unwrap_or_else(|| ProcedureParams::initiator(config_id));

        let episode = self.episode();
        tokio::spawn(async move {
            episode.pause().await;
            if episode.script.drops_at(Step::ProcedureEnable) {
                episode.disconnect(id);
            } else if enable {
                episode.procedures(id, &params).await;
            } else {
                episode.events.procedure_enabled(
                    id,
                    episode.script.status(Step::ProcedureEnable),
                    Some(ProcedureEnableRecord::disabled(config_id)),
                );
            }
        });
        Ok(())
    }
}
