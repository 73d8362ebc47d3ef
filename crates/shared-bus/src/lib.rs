//! # Shared Bus - Process-Wide Signal Bus
//!
//! Typed publish/subscribe registry for notifications that cross subsystem
//! boundaries: radio-link resets from the L1 control channel and global
//! shutdown requests.
//!
//! ## Delivery Rules
//!
//! - Listeners register per [`SignalSubsystem`] and are called in
//!   registration order.
//! - `publish()` delivers synchronously on the calling thread. There is no
//!   queue and no cross-thread hand-off.
//! - Listeners must not block.
//!
//! ```text
//! ┌──────────────┐   publish(Signal)   ┌──────────────┐
//! │ Radio link   │ ──────────────────→ │  SignalBus   │
//! │ Run loop     │                     │              │──→ listener #1
//! └──────────────┘                     │  (ordered)   │──→ listener #2
//!                                      └──────────────┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{GlobalSignal, L1CtlSignal, ResetKind, Signal, SignalSubsystem};
pub use publisher::SignalBus;
pub use subscriber::{ListenerId, SignalListener};
