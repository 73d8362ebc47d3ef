//! # App Supervisor
//!
//! Owns the station registry and the signal bus, and runs one cooperative
//! tick of the main loop at a time.
//!
//! ## Tick
//!
//! ```text
//!  ┌─ lock ─┐ poll radio links ──→ indications
//!  └────────┘
//!             publish L1Ctl resets ──→ lifecycle listener (handle_reset)
//!                                 └──→ cell-selection listener
//!  ┌─ lock ──────────────────────────────────────────────────────────┐
//!  │ per station: not Complete → drain, ingest failure → force off,  │
//!  │              DetachComplete → force off                          │
//!  │              Complete     → release links, remove if deleting    │
//!  └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners lock the registry themselves, so nothing is published while
//! the registry lock is held.
//!
//! ## Shutdown
//!
//! A forced global shutdown tears every station down without waiting for
//! IMSI detach and ends the run loop at once. A graceful one deletes every
//! station and sets the quit flag; the loop ends when the registry is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ms_01_lifecycle::dispatch;
use ms_01_lifecycle::ports::{L1Indication, StackRequest};
use ms_01_lifecycle::{MsRegistry, Reclaim, StartError, StationServices};
use parking_lot::Mutex;
use shared_bus::{
    GlobalSignal, L1CtlSignal, ListenerId, Signal, SignalBus, SignalListener, SignalSubsystem,
};
use shared_types::{MsId, ShutdownState};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::container::AppConfig;

/// Supervisor failures.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A configured station could not be powered on at start
    #[error("Failed to start MS '{name}': {source}")]
    Start {
        name: String,
        #[source]
        source: StartError,
    },
}

/// Result of one [`Supervisor::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick {
    /// Some station did work; tick again without waiting.
    pub work: bool,
    /// A global shutdown has been requested.
    pub quit: bool,
    /// The run loop should end.
    pub done: bool,
}

/// Main-loop owner of the registry and the bus.
pub struct Supervisor {
    registry: Arc<Mutex<MsRegistry>>,
    bus: Arc<SignalBus>,
    quit: Arc<AtomicBool>,
    forced: Arc<AtomicBool>,
    listeners: Vec<(SignalSubsystem, ListenerId)>,
}

impl Supervisor {
    /// Register bus listeners, then create and power on every configured
    /// station (or the default one).
    ///
    /// `quit` is the flag the ingest threads watch.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Start`] if a station cannot be powered on. Stations
    /// already started are stopped and their threads joined first.
    pub fn init(
        config: &AppConfig,
        services: StationServices,
        quit: Arc<AtomicBool>,
    ) -> Result<Self, SupervisorError> {
        let mut supervisor = Self {
            registry: Arc::new(Mutex::new(MsRegistry::new(services))),
            bus: Arc::new(SignalBus::new()),
            quit,
            forced: Arc::new(AtomicBool::new(false)),
            listeners: Vec::new(),
        };
        supervisor.register_listeners();

        for station in config.stations_or_default() {
            let settings = config.settings_for(&station);
            let mut registry = supervisor.registry.lock();
            let id = registry.create(station.name.clone(), settings);
            if let Err(source) = registry.power_on(id) {
                drop(registry);
                error!(ms = %station.name, error = %source, "Power-on failed at start");
                supervisor.exit();
                return Err(SupervisorError::Start {
                    name: station.name,
                    source,
                });
            }
        }

        info!(
            stations = supervisor.registry.lock().len(),
            "Supervisor initialized"
        );
        Ok(supervisor)
    }

    fn register_listeners(&mut self) {
        let registry = Arc::clone(&self.registry);
        let quit = Arc::clone(&self.quit);
        let forced = Arc::clone(&self.forced);
        let on_shutdown = move |signal: &Signal| {
            let Signal::Global(GlobalSignal::Shutdown { force }) = signal else {
                return;
            };
            let mut registry = registry.lock();
            if *force {
                warn!("Forced shutdown requested, tearing down all stations");
                for id in registry.ids() {
                    if let Err(e) = registry.delete(id, true) {
                        error!(%id, error = %e, "Forced delete failed");
                    }
                }
                forced.store(true, Ordering::Release);
                quit.store(true, Ordering::Release);
                return;
            }
            info!("Graceful shutdown requested, deleting all stations");
            for id in registry.ids() {
                if let Err(e) = registry.delete(id, false) {
                    warn!(%id, error = %e, "Graceful delete failed, forcing");
                    if let Err(e) = registry.delete(id, true) {
                        error!(%id, error = %e, "Forced delete failed");
                    }
                }
            }
            quit.store(true, Ordering::Release);
        };
        self.listen(SignalSubsystem::Global, Arc::new(on_shutdown));

        let registry = Arc::clone(&self.registry);
        let on_reset = move |signal: &Signal| {
            let Signal::L1Ctl(L1CtlSignal::Reset { ms, kind }) = signal else {
                return;
            };
            if registry.lock().handle_reset(*ms) {
                debug!(%ms, ?kind, "Reset applied to lifecycle");
            }
        };
        self.listen(SignalSubsystem::L1Ctl, Arc::new(on_reset));

        // Registered second: cell selection sees the reset after the
        // lifecycle has bootstrapped the station.
        let registry = Arc::clone(&self.registry);
        let on_cell_reset = move |signal: &Signal| {
            if let Signal::L1Ctl(L1CtlSignal::Reset { ms, .. }) = signal {
                registry.lock().forward_radio_reset(*ms);
            }
        };
        self.listen(SignalSubsystem::L1Ctl, Arc::new(on_cell_reset));
    }

    fn listen(&mut self, subsystem: SignalSubsystem, listener: Arc<dyn SignalListener>) {
        let id = self.bus.register(subsystem, listener);
        self.listeners.push((subsystem, id));
    }

    /// Run one tick.
    pub fn tick(&self) -> Tick {
        let indications = self.registry.lock().poll_radio();
        let mut work = !indications.is_empty();
        for (ms, indication) in indications {
            let L1Indication::Reset(kind) = indication;
            self.bus.publish(Signal::reset(ms, kind));
        }

        {
            let mut registry = self.registry.lock();
            for id in registry.ids() {
                work |= service(&mut registry, id);
            }
        }

        let quit = self.quit.load(Ordering::Acquire);
        let done =
            self.forced.load(Ordering::Acquire) || (quit && self.registry.lock().is_empty());
        Tick { work, quit, done }
    }

    /// Publish a global shutdown request.
    pub fn shutdown(&self, force: bool) {
        self.bus.publish(Signal::shutdown(force));
    }

    /// Unregister every listener and join every ingest thread.
    pub fn exit(mut self) {
        for (subsystem, id) in self.listeners.drain(..) {
            self.bus.unregister(subsystem, id);
        }
        self.quit.store(true, Ordering::Release);
        self.registry.lock().join_all();
        info!("Supervisor stopped");
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Mutex<MsRegistry>> {
        &self.registry
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<SignalBus> {
        &self.bus
    }

    /// Whether a global shutdown has been requested.
    #[must_use]
    pub fn is_quit(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("stations", &self.registry.lock().len())
            .field("listeners", &self.listeners.len())
            .field("quit", &self.is_quit())
            .finish_non_exhaustive()
    }
}

/// Service one station for this tick. Returns `true` if anything happened.
fn service(registry: &mut MsRegistry, id: MsId) -> bool {
    let Some(station) = registry.get_mut(id) else {
        return false;
    };

    let mut work = false;
    let mut force_off = false;
    if station.shutdown_state() != ShutdownState::Complete {
        work = dispatch::drain(station);
        if let Some(reason) = station.take_failure() {
            warn!(ms = %station.name(), %reason, "Forcing MS off after ingest failure");
            force_off = true;
        }
        while let Some(request) = station.take_stack_request() {
            match request {
                StackRequest::DetachComplete => {
                    debug!(ms = %station.name(), "IMSI detach finished");
                    force_off = true;
                }
            }
        }
    }

    if force_off {
        work = true;
        if let Err(e) = registry.power_off(id, true) {
            error!(%id, error = %e, "Forced power-off failed");
        }
    }

    match registry.reclaim(id) {
        Some(Reclaim::Removed) => true,
        _ => work,
    }
}
