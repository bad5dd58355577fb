//! Host environment: recovery after link loss.
//!
//! The supervisor owns everything that outlives a session (the gateway, the
//! completion slots, the reporter) and rebuilds the role object for every new
//! session, so no session state leaks into the next connection.

mod restart;

pub use restart::{InProcessRestart, ProcessRestart, RecoveryMode, RestartAction};

use std::sync::Arc;

use crate::config::{Config, RecoveryConfig};
use crate::error::Result;
use crate::gateway::Gateway;
use crate::negotiator::{completion_channel, CompletionSlots};
use crate::protocol::Role;
use crate::role::{Initiator, Reflector, RoleProfile, SessionEnd};
use crate::sim::SimController;
use crate::telemetry::Reporter;

/// Build the restart action selected by `config`
pub fn restart_action(config: &RecoveryConfig) -> Arc<dyn RestartAction> {
    match config.mode {
        RecoveryMode::InProcess => Arc::new(InProcessRestart::new()),
        RecoveryMode::Exit => Arc::new(ProcessRestart::new(config.exit_code)),
    }
}

/// Runs one role session after another
pub struct Supervisor<G: ?Sized> {
    profile: RoleProfile,
    gateway: Arc<G>,
    restart: Arc<dyn RestartAction>,
    max_sessions: Option<u64>,
}

impl<G: Gateway + ?Sized> Supervisor<G> {
    /// Create a supervisor for `profile.role`
    pub fn new(profile: RoleProfile, gateway: Arc<G>, restart: Arc<dyn RestartAction>) -> Self {
        Self {
            profile,
            gateway,
            restart,
            max_sessions: None,
        }
    }

    /// Stop after `max` sessions
    #[must_use]
    pub fn with_max_sessions(mut self, max: Option<u64>) -> Self {
        self.max_sessions = max;
        self
    }

    /// Run sessions until the limit is reached or an error ends the loop
    pub async fn run(&self, slots: CompletionSlots) -> Result<Vec<SessionEnd>> {
        match self.profile.role {
            Role::Initiator => self.run_initiator(slots).await,
            Role::Reflector => self.run_reflector(slots).await,
        }
    }

    fn done(&self, sessions: usize) -> bool {
        self.max_sessions
            .is_some_and(|max| sessions as u64 >= max)
    }

    async fn run_initiator(&self, mut slots: CompletionSlots) -> Result<Vec<SessionEnd>> {
        let mut ended = Vec::new();
        while !self.done(ended.len()) {
            let mut initiator = Initiator::new(
                self.profile.clone(),
                Arc::clone(&self.gateway),
                slots,
                Arc::clone(&self.restart),
            );
            ended.push(initiator.run().await?);
            slots = initiator.into_slots();
        }
        Ok(ended)
    }

    async fn run_reflector(&self, slots: CompletionSlots) -> Result<Vec<SessionEnd>> {
        let mut reflector = Reflector::new(
            self.profile.clone(),
            Arc::clone(&self.gateway),
            slots,
            Arc::clone(&self.restart),
        );
        if self.max_sessions.is_none() {
            reflector.run().await?;
            return Ok(Vec::new());
        }

        reflector.start()?;
        let mut ended = Vec::new();
        while !self.done(ended.len()) {
            ended.push(reflector.serve_one().await?);
        }
        Ok(ended)
    }
}

/// Run `role` against the simulated controller described by `config`
pub async fn run_simulated(config: &Config, role: Role) -> Result<Vec<SessionEnd>> {
    let reporter = Arc::new(Reporter::new());
    let (dispatcher, slots) = completion_channel(Arc::clone(&reporter));
    let sim = Arc::new(SimController::new(
        role,
        config.sim.clone(),
        Arc::new(dispatcher),
    ));

    tracing::info!(
        role = %role,
        config_id = config.ranging.config_id,
        recovery = %config.recovery.mode,
        "Starting Channel Sounding {role}"
    );

    let supervisor = Supervisor::new(
        RoleProfile::for_role(role, config.ranging.config_id),
        sim,
        restart_action(&config.recovery),
    )
    .with_max_sessions(config.recovery.max_sessions);

    let ended = supervisor.run(slots).await?;
    tracing::info!(
        sessions = ended.len(),
        results = reporter.reported(),
        "Supervisor finished"
    );
    Ok(ended)
}
