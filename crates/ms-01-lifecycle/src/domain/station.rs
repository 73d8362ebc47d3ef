//! # Mobile Station
//!
//! One simulated phone: its settings, protocol stack, open links and the
//! power-off ladder.
//!
//! ## State Machine
//!
//! ```text
//!                power_on
//!   [Complete] ──────────→ [None] ── first reset ──→ started
//!       ↑                    │
//!       │ reset ack          │ power_off(graceful, started)
//!       │                    ↓
//! [AwaitingReset] ←──── [ImsiDetach]
//!       ↑   teardown         (detach done → power_off(force))
//!       └─────────── power_off(force) from None/ImsiDetach
//! ```
//!
//! A station that never started skips `AwaitingReset` and lands directly in
//! `Complete`.

use std::sync::Arc;

use shared_bus::ResetKind;
use shared_types::{
    InboxReceiver, InboxSender, Layer, MmEventKind, MsId, SessionContext, SessionHandle,
    ShutdownState, StationInbound,
};
use tracing::{debug, error, info, warn};

use super::call_control::CallControlSink;
use super::settings::{MsSettings, SimType};
use crate::error::{StartError, StopError};
use crate::ports::{
    IngestHandle, IngestRequest, ProtocolStack, RadioLink, SimAccessConnector, SimAccessLink,
    SimCard, StackRequest, StationObserver,
};
use crate::services::StationServices;

/// Result of a power-off request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// IMSI detach started; teardown follows once the network answers.
    Pending,
    /// Layers are down; the station is `AwaitingReset` or `Complete`.
    Stopped,
    /// Nothing to do in the current state.
    Unchanged,
}

/// A simulated GSM mobile station.
pub struct MobileStation {
    id: MsId,
    name: String,
    settings: MsSettings,
    started: bool,
    shutdown: ShutdownState,
    deleting: bool,
    session: SessionHandle,
    stack: Box<dyn ProtocolStack>,
    radio: Option<Box<dyn RadioLink>>,
    sim_access: Option<Box<dyn SimAccessLink>>,
    ingest: Option<Box<dyn IngestHandle>>,
    inbox_tx: InboxSender,
    inbox_rx: InboxReceiver,
    call_control: CallControlSink,
    observer: Arc<dyn StationObserver>,
    failure: Option<String>,
}

impl MobileStation {
    /// Create a powered-off station.
    #[must_use]
    pub fn new(
        id: MsId,
        name: String,
        settings: MsSettings,
        stack: Box<dyn ProtocolStack>,
        call_control: CallControlSink,
        observer: Arc<dyn StationObserver>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = shared_types::station_inbox();
        Self {
            id,
            name,
            settings,
            started: false,
            shutdown: ShutdownState::Complete,
            deleting: false,
            session: shared_types::new_session_handle(),
            stack,
            radio: None,
            sim_access: None,
            ingest: None,
            inbox_tx,
            inbox_rx,
            call_control,
            observer,
            failure: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> MsId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn settings(&self) -> &MsSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    #[must_use]
    pub fn call_control(&self) -> &CallControlSink {
        &self.call_control
    }

    /// Snapshot of the session context written by the ingest thread.
    #[must_use]
    pub fn session(&self) -> SessionContext {
        self.session.read().clone()
    }

    /// Shared session handle, for uplink traffic.
    #[must_use]
    pub fn session_handle(&self) -> SessionHandle {
        Arc::clone(&self.session)
    }

    /// Whether the radio link is open.
    #[must_use]
    pub fn has_radio_link(&self) -> bool {
        self.radio.is_some()
    }

    /// Whether an ingest thread is attached (running or not yet joined).
    #[must_use]
    pub fn has_ingest(&self) -> bool {
        self.ingest.is_some()
    }

    /// Address the ingest socket is bound to.
    #[must_use]
    pub fn ingest_addr(&self) -> Option<std::net::SocketAddr> {
        self.ingest.as_ref().map(|h| h.local_addr())
    }

    /// Take the ingest failure reported since the last call.
    pub fn take_failure(&mut self) -> Option<String> {
        self.failure.take()
    }

    /// Take the next request raised by the protocol stack.
    pub fn take_stack_request(&mut self) -> Option<StackRequest> {
        self.stack.take_request()
    }

    pub(crate) fn stack_mut(&mut self) -> &mut dyn ProtocolStack {
        self.stack.as_mut()
    }

    pub(crate) fn mark_deleting(&mut self) {
        self.deleting = true;
    }

    fn set_started(&mut self, started: bool) {
        if self.started == started {
            return;
        }
        self.started = started;
        self.observer.notify_started(self.id, &self.name, started);
    }

    fn set_shutdown(&mut self, next: ShutdownState) {
        let old = self.shutdown;
        if !old.can_advance_to(next) {
            warn!(ms = %self.name, %old, new = %next, "Refusing shutdown state regression");
            return;
        }
        self.shutdown = next;
        debug!(ms = %self.name, %old, new = %next, "Shutdown state changed");
        self.observer.notify_shutdown(self.id, &self.name, old, next);
    }

    /// Bring the station up. The caller has checked resource conflicts.
    pub(crate) fn power_on(&mut self, services: &StationServices) -> Result<(), StartError> {
        if self.shutdown != ShutdownState::Complete {
            return Err(StartError::NotStopped {
                state: self.shutdown,
            });
        }

        // A thread from the previous cycle must be gone before the port is rebound.
        if let Some(handle) = &self.ingest {
            if !handle.is_finished() {
                handle.request_stop();
                return Err(StartError::IngestRunning);
            }
        }
        self.join_ingest();
        while self.inbox_rx.try_next().is_some() {}
        self.failure = None;
        *self.session.write() = SessionContext::default();

        let ingest = services
            .ingest
            .launch(IngestRequest {
                ms: self.id,
                name: self.name.clone(),
                port: self.settings.fbts_port,
                session: Arc::clone(&self.session),
                inbox: self.inbox_tx.clone(),
            })
            .map_err(StartError::Ingest)?;
        info!(ms = %self.name, addr = %ingest.local_addr(), "FBTS ingest listening");
        self.ingest = Some(ingest);

        if self.settings.imei_random {
            self.settings.randomize_imei(&mut rand::thread_rng());
            info!(ms = %self.name, imei = %self.settings.imei, "Using random IMEI");
        }

        for layer in Layer::INIT_ORDER {
            self.stack.init(layer);
        }

        let path = self.settings.layer2_socket_path.clone();
        let mut radio = match services.radio.open(&path) {
            Ok(radio) => radio,
            Err(source) => {
                error!(ms = %self.name, ?path, error = %source, "Failed to open layer2 socket");
                self.abort_power_on();
                return Err(StartError::RadioLinkOpen { path, source });
            }
        };

        self.set_shutdown(ShutdownState::None);
        self.set_started(false);

        if self.settings.has_default_imei() {
            warn!(
                ms = %self.name,
                "Default IMEI in use, change it in the config so the network can tell phones apart"
            );
        }

        if let Err(e) = radio.request_reset(ResetKind::Full) {
            warn!(ms = %self.name, error = %e, "Failed to request layer1 reset");
        }
        self.radio = Some(radio);

        info!(ms = %self.name, "Mobile station powered on");
        Ok(())
    }

    /// Undo a power-on that failed after layers were initialized.
    ///
    /// The state is still `Complete`, so the normal teardown path would be a
    /// no-op.
    fn abort_power_on(&mut self) {
        for layer in Layer::EXIT_ORDER {
            self.stack.exit(layer);
        }
        if let Some(ingest) = &self.ingest {
            ingest.request_stop();
        }
    }

    /// Power the station off.
    ///
    /// Forced requests act in `None` and `ImsiDetach`; graceful ones only in
    /// `None`. A graceful request on a started station only starts the IMSI
    /// detach and reports [`StopOutcome::Pending`].
    pub(crate) fn power_off(&mut self, force: bool) -> Result<StopOutcome, StopError> {
        let applies = if force {
            self.shutdown <= ShutdownState::ImsiDetach
        } else {
            self.shutdown == ShutdownState::None
        };
        if !applies {
            return Ok(StopOutcome::Unchanged);
        }

        if !force && self.started {
            let kind = MmEventKind::ImsiDetach;
            let event = self
                .stack
                .mm_event_alloc(kind)
                .ok_or(StopError::EventAllocation { kind })?;
            self.set_shutdown(ShutdownState::ImsiDetach);
            self.stack.mm_event_submit(event);
            info!(ms = %self.name, "IMSI detach started");
            return Ok(StopOutcome::Pending);
        }

        self.teardown();
        Ok(StopOutcome::Stopped)
    }

    fn teardown(&mut self) {
        for layer in Layer::EXIT_ORDER {
            self.stack.exit(layer);
        }
        if let Some(ingest) = &self.ingest {
            ingest.request_stop();
        }

        let was_started = self.started;
        self.set_started(false);

        if !was_started {
            self.set_shutdown(ShutdownState::Complete);
            info!(ms = %self.name, "Mobile station powered off");
            return;
        }

        self.set_shutdown(ShutdownState::AwaitingReset);
        let requested = match self.radio.as_mut().map(|r| r.request_reset(ResetKind::Full)) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                warn!(ms = %self.name, error = %e, "Failed to request layer1 reset");
                false
            }
            None => false,
        };
        if !requested {
            // Nobody will acknowledge.
            self.set_shutdown(ShutdownState::Complete);
        }
    }

    /// React to a layer-1 reset.
    ///
    /// Completes a pending power-off, or performs the first-time SIM
    /// bootstrap of a freshly powered-on station. Returns `true` if the
    /// reset changed anything.
    pub(crate) fn handle_reset(&mut self, sim_access: &dyn SimAccessConnector) -> bool {
        match self.shutdown {
            ShutdownState::AwaitingReset => {
                self.set_shutdown(ShutdownState::Complete);
                info!(ms = %self.name, "Mobile station powered off");
                true
            }
            ShutdownState::None if !self.started => {
                self.bootstrap(sim_access);
                self.set_started(true);
                true
            }
            _ => false,
        }
    }

    fn bootstrap(&mut self, sim_access: &dyn SimAccessConnector) {
        match self.settings.sim {
            SimType::Reader => self.stack.insert_sim(SimCard::Reader),
            SimType::Test => self
                .stack
                .insert_sim(SimCard::Test(self.settings.test_card.clone())),
            SimType::Sap => {
                let path = &self.settings.sap_socket_path;
                match sim_access.open(path) {
                    Ok(link) => {
                        self.sim_access = Some(link);
                        self.stack.insert_sim(SimCard::Sap);
                    }
                    Err(e) => error!(ms = %self.name, ?path, error = %e, "Failed to open SAP socket"),
                }
            }
            SimType::None => self.stack.switch_on(),
        }
        debug!(ms = %self.name, sim = %self.settings.sim, "SIM bootstrap done");
    }

    pub(crate) fn forward_radio_reset(&mut self) {
        self.stack.on_radio_reset();
    }

    pub(crate) fn poll_radio(&mut self) -> Option<crate::ports::L1Indication> {
        self.radio.as_mut()?.poll_indication()
    }

    /// Apply messages queued by the ingest thread.
    ///
    /// Returns `true` if anything was taken from the inbox.
    pub(crate) fn pump_inbox(&mut self) -> bool {
        let mut worked = false;
        while let Some(msg) = self.inbox_rx.try_next() {
            worked = true;
            match msg {
                StationInbound::SsRequest { ussd, flags } => {
                    debug!(ms = %self.name, %ussd, "SS request");
                    self.stack.ss_request(&ussd, flags);
                }
                StationInbound::AuthResponse { session_id, sres } => {
                    match self.stack.mm_event_alloc(MmEventKind::AuthResponse) {
                        Some(mut event) => {
                            event.sres = sres;
                            self.stack.mm_event_submit(event);
                        }
                        None => {
                            warn!(ms = %self.name, session_id, "No MM event buffer, dropping auth response");
                        }
                    }
                }
                StationInbound::IngestFailed { reason } => {
                    error!(ms = %self.name, %reason, "FBTS ingest failed");
                    self.failure = Some(reason);
                }
            }
        }
        worked
    }

    /// Close the radio and SIM-access links, if open.
    pub(crate) fn release_links(&mut self) -> bool {
        let mut released = false;
        if let Some(mut radio) = self.radio.take() {
            radio.close();
            released = true;
        }
        if let Some(mut sim) = self.sim_access.take() {
            sim.close();
            released = true;
        }
        released
    }

    /// Join the ingest thread if it has exited.
    ///
    /// Returns `true` when no thread remains attached.
    pub(crate) fn reap_ingest(&mut self) -> bool {
        match &self.ingest {
            None => true,
            Some(handle) if handle.is_finished() => {
                self.join_ingest();
                true
            }
            Some(handle) => {
                handle.request_stop();
                false
            }
        }
    }

    /// Stop and join the ingest thread, blocking until it exits.
    pub(crate) fn join_ingest(&mut self) {
        if let Some(handle) = self.ingest.take() {
            handle.request_stop();
            handle.join();
            debug!(ms = %self.name, "FBTS ingest joined");
        }
    }

    pub(crate) fn release_call_control(&self) {
        self.call_control.detach(&self.name);
    }
}

impl std::fmt::Debug for MobileStation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobileStation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("started", &self.started)
            .field("shutdown", &self.shutdown)
            .field("deleting", &self.deleting)
            .field("call_control", &self.call_control)
            .finish_non_exhaustive()
    }
}
