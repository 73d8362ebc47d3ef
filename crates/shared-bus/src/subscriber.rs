//! # Signal Listeners
//!
//! Defines the receiving side of the bus.

use std::fmt;

use crate::events::Signal;

/// Handle returned by [`crate::SignalBus::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Trait for receiving signals from the bus.
///
/// Called synchronously from `publish()`; implementations must return
/// promptly and must not block.
pub trait SignalListener: Send + Sync {
    /// Handle one signal.
    fn on_signal(&self, signal: &Signal);
}

impl<F> SignalListener for F
where
    F: Fn(&Signal) + Send + Sync,
{
    fn on_signal(&self, signal: &Signal) {
        self(signal);
    }
}
