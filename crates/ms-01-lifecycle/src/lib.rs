//! # ms-01-lifecycle
//!
//! Power-on / power-off lifecycle of simulated GSM mobile stations and the
//! cooperative dispatcher that drains their protocol-layer queues.
//!
//! ## Overview
//!
//! - **Registry**: owns every [`MobileStation`], indexed by [`MsId`] in
//!   creation order. All lifecycle operations go through it.
//! - **State machine**: `None → ImsiDetach → AwaitingReset → Complete`,
//!   with power-on as the only way back to `None`.
//! - **Dispatcher**: [`dispatch::drain`] polls every work queue in a fixed
//!   order until a whole pass reports no work.
//! - **Two-phase delete**: [`MsRegistry::delete`] marks, and
//!   [`MsRegistry::reclaim`] removes once the station is `Complete`.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────────────┐
//!  power_on ────→ │         MsRegistry         │ ──→ IngestLauncher (FBTS)
//!  power_off ───→ │  ┌──────────────────────┐  │ ──→ RadioLinkConnector
//!  delete ──────→ │  │    MobileStation     │  │ ──→ StationObserver
//!  reclaim ─────→ │  │  ProtocolStack (ext) │  │
//!                 │  └──────────────────────┘  │
//!                 └────────────────────────────┘
//! ```
//!
//! The protocol layers, radio link, SIM access and FBTS socket are all
//! reached through the traits in [`ports::outbound`].
//!
//! [`MsId`]: shared_types::MsId

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dispatch;
pub mod domain;
pub mod error;
pub mod ports;
pub mod registry;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use domain::{
    CallControlSink, ChannelCapability, MobileStation, MsSettings, SimType, StopOutcome,
    TestCardSettings,
};
pub use error::{LifecycleError, StartError, StopError};
pub use registry::{MsRegistry, Reclaim};
pub use services::StationServices;
