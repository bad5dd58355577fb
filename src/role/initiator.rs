//! Initiator role: negotiates once, then waits for results until the link drops.

use std::sync::Arc;

use super::{RoleProfile, SessionEnd};
use crate::error::{CsError, Result};
use crate::gateway::Gateway;
use crate::host::RestartAction;
use crate::negotiator::{CompletionSlots, Negotiator};
use crate::protocol::{DisconnectReason, Role, Session};

/// Initiator role policy
pub struct Initiator<G: ?Sized> {
    profile: RoleProfile,
    gateway: Arc<G>,
    slots: CompletionSlots,
    restart: Arc<dyn RestartAction>,
}

impl<G: Gateway + ?Sized> Initiator<G> {
    /// Create an initiator consuming completions from `slots`
    pub fn new(
        profile: RoleProfile,
        gateway: Arc<G>,
        slots: CompletionSlots,
        restart: Arc<dyn RestartAction>,
    ) -> Self {
        Self {
            profile,
            gateway,
            slots,
            restart,
        }
    }

    /// Hand the completion slots back
    pub fn into_slots(self) -> CompletionSlots {
        self.slots
    }

    /// Bring the stack up, scan and wait for the first connection
    pub async fn connect(&mut self) -> Result<Session> {
        self.gateway
            .enable()
            .map_err(|e| CsError::Startup(format!("Bluetooth init failed ({e})")))?;
        self.gateway
            .start_scan()
            .map_err(|e| CsError::Startup(format!("Scanning failed to start ({e})")))?;
        tracing::info!("Scanning successfully started");

        let link = self
            .slots
            .wait_connected()
            .await
            .ok_or(CsError::EventsClosed)?;
        Ok(Session::new(link, Role::Initiator, self.profile.config_id))
    }

    /// Drive `session` up to enabled procedures; any failure is returned
    pub async fn negotiate(&mut self, session: &mut Session) -> Result<()> {
        let profile = &self.profile;
        let config = profile.config.as_ref().ok_or_else(|| {
            CsError::Config("initiator profile has no configuration to create".to_string())
        })?;
        let mut negotiator = Negotiator::new(&*self.gateway, &mut self.slots, session);

        negotiator.secure(profile.security_level).await?;
        negotiator
            .apply_default_settings(&profile.default_settings)
            .await?;
        negotiator.exchange_capabilities().await?;
        negotiator
            .create_config(config, profile.create_context)
            .await?;
        negotiator.enable_security().await?;
        negotiator
            .set_procedure_parameters(&profile.procedure)
            .await?;
        negotiator.enable_procedures().await
    }

    /// Run one session to its end.
    ///
    /// Link loss ends the session normally and triggers the restart action
    /// exactly once. Step failures are returned as errors.
    pub async fn run(&mut self) -> Result<SessionEnd> {
        let mut session = self.connect().await?;

        match self.negotiate(&mut session).await {
            Ok(()) => tracing::info!("CS procedures started. Waiting for results..."),
            Err(CsError::LinkLost(reason)) => return Ok(self.finish(&session, reason)),
            Err(e) => {
                tracing::error!(session = %session.id(), state = ?session.state(), "{e}");
                return Err(e);
            },
        }

        let reason = Negotiator::new(&*self.gateway, &mut self.slots, &mut session)
            .idle()
            .await?;
        Ok(self.finish(&session, reason))
    }

    fn finish(&mut self, session: &Session, reason: DisconnectReason) -> SessionEnd {
        let summary = session.summary();
        tracing::info!(
            session = %summary.session_id,
            state = ?summary.state,
            uptime_secs = summary.uptime_secs,
            "Session terminated (reason {reason})"
        );
        self.restart.restart(&summary);
        let dropped = self.slots.drain();
        if dropped > 0 {
            tracing::debug!("Discarded {dropped} stale signals");
        }
        SessionEnd { summary, reason }
    }
}
