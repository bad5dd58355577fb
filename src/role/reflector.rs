//! Reflector role: answers every connection and re-arms after each one.

use std::sync::Arc;

use super::{RoleProfile, SessionEnd};
use crate::error::{CsError, Result};
use crate::gateway::Gateway;
use crate::host::RestartAction;
use crate::negotiator::{CompletionSlots, Negotiator};
use crate::protocol::{DisconnectReason, Role, Session};

/// Reflector role policy
pub struct Reflector<G: ?Sized> {
    profile: RoleProfile,
    gateway: Arc<G>,
    slots: CompletionSlots,
    restart: Arc<dyn RestartAction>,
    served: u64,
}

impl<G: Gateway + ?Sized> Reflector<G> {
    /// Create a reflector consuming completions from `slots`
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
            served: 0,
        }
    }

    /// Bring the radio stack up
    pub fn start(&self) -> Result<()> {
        self.gateway
            .enable()
            .map_err(|e| CsError::Startup(format!("Bluetooth init failed ({e})")))
    }

    /// Number of sessions served so far
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Advertise, serve one connection and return when its link drops.
    ///
    /// Step failures are logged and do not end the session early.
    pub async fn serve_one(&mut self) -> Result<SessionEnd> {
        self.gateway
            .start_advertising()
            .map_err(|e| CsError::Startup(format!("Advertising failed to start ({e})")))?;
        tracing::info!("Advertising started. Waiting for connection...");

        let link = self
            .slots
            .wait_connected()
            .await
            .ok_or(CsError::EventsClosed)?;
        let mut session = Session::new(link, Role::Reflector, self.profile.config_id);

        let mut negotiator = Negotiator::new(&*self.gateway, &mut self.slots, &mut session);
        let reason = match respond(&mut negotiator, &self.profile).await {
            Ok(()) => negotiator.idle().await?,
            Err(CsError::LinkLost(reason)) => reason,
            Err(e) => return Err(e),
        };

        Ok(self.finish(&session, reason))
    }

    /// Serve connections until a startup error or the event source closes
    pub async fn run(&mut self) -> Result<()> {
        self.start()?;
        loop {
            let end = self.serve_one().await?;
            tracing::debug!(
                session = %end.summary.session_id,
                served = self.served,
                "Re-arming for the next connection"
            );
        }
    }

    fn finish(&mut self, session: &Session, reason: DisconnectReason) -> SessionEnd {
        let summary = session.summary();
        tracing::info!(
            session = %summary.session_id,
            state = ?summary.state,
            uptime_secs = summary.uptime_secs,
            "Session terminated (reason {reason})"
        );
        self.served += 1;
        self.restart.restart(&summary);
        self.slots.drain();
        SessionEnd { summary, reason }
    }
}

/// Answer the peer's negotiation on one link. Failures other than link loss
/// are logged and leave the link up until the peer drops it.
async fn respond<G: Gateway + ?Sized>(
    negotiator: &mut Negotiator<'_, G>,
    profile: &RoleProfile,
) -> Result<()> {
    match negotiator
        .apply_default_settings(&profile.default_settings)
        .await
    {
        Err(e @ CsError::LinkLost(_)) => return Err(e),
        Err(e) => tracing::warn!("{e}"),
        Ok(()) => {},
    }

    negotiator.await_peer_config().await?;

    match negotiator.set_procedure_parameters(&profile.procedure).await {
        Ok(()) => tracing::info!("CS procedures configured. Waiting for results..."),
        Err(e @ CsError::LinkLost(_)) => return Err(e),
        Err(e) => tracing::warn!("{e}"),
    }
    Ok(())
}
