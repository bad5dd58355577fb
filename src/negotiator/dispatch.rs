//! Event dispatch into single-slot completion channels.
//!
//! [`EventDispatcher`] is the one [`RangingEvents`] implementation. It runs on
//! the controller's context and never blocks: each completion kind has a
//! channel of capacity one, and a signal arriving while its slot is still
//! full is dropped, the same way a binary semaphore ignores a second give.
//! Subevent results bypass the slots and go straight to the [`Reporter`].

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

use crate::protocol::{
    CapabilitySnapshot, Completion, CompletionPayload, ConfigRecord, DisconnectReason, HciStatus,
    LinkHandle, LinkId, ProcedureEnableRecord, RangingEvents, SecurityLevel, Step,
};
use crate::telemetry::{Reporter, SubeventResult};

/// A link went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkLoss {
    /// Link that went down
    pub link: LinkId,
    /// Reason reported by the link layer
    pub reason: DisconnectReason,
}

/// What a wait on the slots produced
#[derive(Debug)]
pub enum SlotEvent {
    /// A completion for the awaited step(s)
    Completion(Completion),
    /// The link went down
    LinkLost(LinkLoss),
}

/// Producer half: implements [`RangingEvents`]
pub struct EventDispatcher {
    connected: Sender<LinkHandle>,
    link_lost: Sender<LinkLoss>,
    security: Sender<Completion>,
    capabilities: Sender<Completion>,
    config: Sender<Completion>,
    security_enable: Sender<Completion>,
    procedure_enable: Sender<Completion>,
    reporter: Arc<Reporter>,
}

/// Consumer half: owned by the driving task
pub struct CompletionSlots {
    connected: Receiver<LinkHandle>,
    link_lost: Receiver<LinkLoss>,
    security: Receiver<Completion>,
    capabilities: Receiver<Completion>,
    config: Receiver<Completion>,
    security_enable: Receiver<Completion>,
    procedure_enable: Receiver<Completion>,
}

/// Create a connected dispatcher/slots pair
pub fn completion_channel(reporter: Arc<Reporter>) -> (EventDispatcher, CompletionSlots) {
    let (connected_tx, connected_rx) = mpsc::channel(1);
    let (lost_tx, lost_rx) = mpsc::channel(1);
    let (security_tx, security_rx) = mpsc::channel(1);
    let (caps_tx, caps_rx) = mpsc::channel(1);
    let (config_tx, config_rx) = mpsc::channel(1);
    let (sec_enable_tx, sec_enable_rx) = mpsc::channel(1);
    let (proc_enable_tx, proc_enable_rx) = mpsc::channel(1);

    let dispatcher = EventDispatcher {
        connected: connected_tx,
        link_lost: lost_tx,
        security: security_tx,
        capabilities: caps_tx,
        config: config_tx,
        security_enable: sec_enable_tx,
        procedure_enable: proc_enable_tx,
        reporter,
    };
    let slots = CompletionSlots {
        connected: connected_rx,
        link_lost: lost_rx,
        security: security_rx,
        capabilities: caps_rx,
        config: config_rx,
        security_enable: sec_enable_rx,
        procedure_enable: proc_enable_rx,
    };

    (dispatcher, slots)
}

fn give<T>(slot: &Sender<T>, value: T, what: &str) {
    match slot.try_send(value) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => {
            tracing::debug!("{what} signal already pending, dropping duplicate");
        },
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("{what} signal dropped: no consumer");
        },
    }
}

impl EventDispatcher {
    /// Reporter receiving subevent results
    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    fn complete(&self, step: Step, completion: Completion) {
        let slot = match step {
            Step::Security => &self.security,
            Step::Capabilities => &self.capabilities,
            Step::Config => &self.config,
            Step::SecurityEnable => &self.security_enable,
            Step::ProcedureEnable => &self.procedure_enable,
            Step::ProcedureParams => return,
        };
        give(slot, completion, step.name());
    }
}

impl RangingEvents for EventDispatcher {
    fn connected(&self, link: LinkHandle, status: HciStatus) {
        tracing::info!("Connected to {} (err {})", link.peer(), status);
        if status.is_success() {
            give(&self.connected, link, "connected");
        }
    }

    fn disconnected(&self, link: LinkId, reason: DisconnectReason) {
        tracing::info!("Disconnected (reason {reason})");
        give(&self.link_lost, LinkLoss { link, reason }, "disconnected");
    }

    fn security_changed(&self, link: LinkId, level: SecurityLevel, status: HciStatus) {
        self.complete(
            Step::Security,
            Completion {
                link,
                status,
                payload: CompletionPayload::Security(level),
            },
        );
    }

    fn remote_capabilities(
        &self,
        link: LinkId,
        status: HciStatus,
        capabilities: Option<CapabilitySnapshot>,
    ) {
        self.complete(
            Step::Capabilities,
            Completion {
                link,
                status,
                payload: CompletionPayload::Capabilities(capabilities),
            },
        );
    }

    fn config_created(&self, link: LinkId, status: HciStatus, config: Option<ConfigRecord>) {
        self.complete(
            Step::Config,
            Completion {
                link,
                status,
                payload: CompletionPayload::Config(config),
            },
        );
    }

    fn security_enabled(&self, link: LinkId, status: HciStatus) {
        self.complete(
            Step::SecurityEnable,
            Completion {
                link,
                status,
                payload: CompletionPayload::SecurityEnabled,
            },
        );
    }

    fn procedure_enabled(
        &self,
        link: LinkId,
        status: HciStatus,
        record: Option<ProcedureEnableRecord>,
    ) {
        self.complete(
            Step::ProcedureEnable,
            Completion {
                link,
                status,
                payload: CompletionPayload::ProcedureEnable(record),
            },
        );
    }

    fn subevent_result(&self, _link: LinkId, result: SubeventResult) {
        self.reporter.report(&result);
    }
}

impl CompletionSlots {
    /// Wait for the next successful connection
    pub async fn wait_connected(&mut self) -> Option<LinkHandle> {
        self.connected.recv().await
    }

    /// Wait for the completion of `step`, or link loss, whichever comes first.
    ///
    /// Link loss is polled first so a pending disconnect always wins.
    pub async fn wait_step(&mut self, step: Step) -> Option<SlotEvent> {
        let Self {
            link_lost,
            security,
            capabilities,
            config,
            security_enable,
            procedure_enable,
            ..
        } = self;
        let slot = match step {
            Step::Security => security,
            Step::Capabilities => capabilities,
            Step::Config => config,
            Step::SecurityEnable => security_enable,
            Step::ProcedureEnable => procedure_enable,
            Step::ProcedureParams => {
                return link_lost.recv().await.map(SlotEvent::LinkLost);
            },
        };

        tokio::select! {
            biased;
            lost = link_lost.recv() => lost.map(SlotEvent::LinkLost),
            completion = slot.recv() => completion.map(SlotEvent::Completion),
        }
    }

    /// Wait for any completion, or link loss
    pub async fn wait_any(&mut self) -> Option<SlotEvent> {
        tokio::select! {
            biased;
            lost = self.link_lost.recv() => lost.map(SlotEvent::LinkLost),
            c = self.security.recv() => c.map(SlotEvent::Completion),
            c = self.capabilities.recv() => c.map(SlotEvent::Completion),
            c = self.config.recv() => c.map(SlotEvent::Completion),
            c = self.security_enable.recv() => c.map(SlotEvent::Completion),
            c = self.procedure_enable.recv() => c.map(SlotEvent::Completion),
        }
    }

    /// Take a link loss for `link` that is already pending, without waiting.
    ///
    /// Losses reported for other links are discarded.
    pub fn pending_loss(&mut self, link: LinkId) -> Option<LinkLoss> {
        while let Ok(loss) = self.link_lost.try_recv() {
            if loss.link == link {
                return Some(loss);
            }
            tracing::debug!("Ignoring link loss on {}", loss.link);
        }
        None
    }

    /// Wait until `link` is reported lost
    pub async fn wait_loss(&mut self, link: LinkId) -> Option<LinkLoss> {
        loop {
            let loss = self.link_lost.recv().await?;
            if loss.link == link {
                return Some(loss);
            }
            tracing::debug!("Ignoring link loss on {}", loss.link);
        }
    }

    /// Discard every pending signal; returns how many were dropped
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.connected.try_recv().is_ok() {
            dropped += 1;
        }
        while self.link_lost.try_recv().is_ok() {
            dropped += 1;
        }
        for slot in [
            &mut self.security,
            &mut self.capabilities,
            &mut self.config,
            &mut self.security_enable,
            &mut self.procedure_enable,
        ] {
            while slot.try_recv().is_ok() {
                dropped += 1;
            }
        }
        dropped
    }
}
