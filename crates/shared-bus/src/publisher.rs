//! # Signal Bus
//!
//! Defines the publishing side of the bus and the listener registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::events::{Signal, SignalSubsystem};
use crate::subscriber::{ListenerId, SignalListener};

struct Registration {
    id: ListenerId,
    subsystem: SignalSubsystem,
    listener: Arc<dyn SignalListener>,
}

/// Process-wide signal registry.
///
/// Delivery is synchronous and ordered by registration. The listener list is
/// snapshotted before delivery, so a listener may register or unregister
/// other listeners while being called; the change applies to the next
/// publish.
pub struct SignalBus {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    signals_published: AtomicU64,
}

impl SignalBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            signals_published: AtomicU64::new(0),
        }
    }

    /// Register a listener for one subsystem.
    pub fn register(
        &self,
        subsystem: SignalSubsystem,
        listener: Arc<dyn SignalListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            subsystem,
            listener,
        });
        debug!(subsystem = ?subsystem, listener = %id, "Signal listener registered");
        id
    }

    /// Remove a listener.
    ///
    /// Returns `false` if no listener with that id is registered for
    /// `subsystem`.
    pub fn unregister(&self, subsystem: SignalSubsystem, id: ListenerId) -> bool {
        let mut regs = self.registrations.write();
        let before = regs.len();
        regs.retain(|r| !(r.id == id && r.subsystem == subsystem));
        let removed = regs.len() != before;
        if removed {
            debug!(subsystem = ?subsystem, listener = %id, "Signal listener unregistered");
        }
        removed
    }

    /// Deliver a signal to every listener of its subsystem.
    ///
    /// Returns the number of listeners called.
    pub fn publish(&self, signal: Signal) -> usize {
        let subsystem = signal.subsystem();
        self.signals_published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<Arc<dyn SignalListener>> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.subsystem == subsystem)
            .map(|r| Arc::clone(&r.listener))
            .collect();

        trace!(signal = ?signal, listeners = targets.len(), "Publishing signal");
        for listener in &targets {
            listener.on_signal(&signal);
        }
        targets.len()
    }

    /// Number of listeners registered for a subsystem.
    #[must_use]
    pub fn listener_count(&self, subsystem: SignalSubsystem) -> usize {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.subsystem == subsystem)
            .count()
    }

    /// Total number of signals published.
    #[must_use]
    pub fn signals_published(&self) -> u64 {
        self.signals_published.load(Ordering::Relaxed)
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
