//! # Signal Events
//!
//! Closed set of signals carried by the bus. Each variant belongs to exactly
//! one subsystem; listeners only see signals of the subsystem they
//! registered for.

use shared_types::MsId;

/// All signals that can be published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Notification from the L1 control channel of a station.
    L1Ctl(L1CtlSignal),
    /// Process-wide notification.
    Global(GlobalSignal),
}

/// Signals raised by a station's radio link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L1CtlSignal {
    /// Layer 1 finished a reset.
    Reset {
        /// Station whose radio was reset.
        ms: MsId,
        /// Kind of reset performed.
        kind: ResetKind,
    },
}

/// Layer 1 reset kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    /// Layer 1 boot indication.
    Boot,
    /// Full reset of the layer 1 state.
    Full,
    /// Scheduler-only reset.
    Scheduler,
}

/// Process-wide signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalSignal {
    /// Request to shut the process down.
    Shutdown {
        /// Skip graceful detach and quit at once.
        force: bool,
    },
}

/// Subsystem tags used for listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSubsystem {
    /// L1 control channel signals.
    L1Ctl,
    /// Process-wide signals.
    Global,
}

impl Signal {
    /// Get the subsystem this signal is delivered to.
    #[must_use]
    pub fn subsystem(&self) -> SignalSubsystem {
        match self {
            Self::L1Ctl(_) => SignalSubsystem::L1Ctl,
            Self::Global(_) => SignalSubsystem::Global,
        }
    }

    /// Shorthand for a reset signal.
    #[must_use]
    pub fn reset(ms: MsId, kind: ResetKind) -> Self {
        Self::L1Ctl(L1CtlSignal::Reset { ms, kind })
    }

    /// Shorthand for a shutdown request.
    #[must_use]
    pub fn shutdown(force: bool) -> Self {
        Self::Global(GlobalSignal::Shutdown { force })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_mapping() {
        assert_eq!(
            Signal::reset(MsId(1), ResetKind::Full).subsystem(),
            SignalSubsystem::L1Ctl
        );
        assert_eq!(Signal::shutdown(false).subsystem(), SignalSubsystem::Global);
    }
}
