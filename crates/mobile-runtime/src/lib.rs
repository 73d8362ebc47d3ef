//! # Mobile Runtime Library
//!
//! Runtime of the `mobile` binary, exposed as a library for the integration
//! tests.
//!
//! - `container/` - configuration and default adapter wiring
//! - `adapters/` - L1CTL, SAP, MNCC, FBTS ingest and loopback stack adapters
//! - `supervisor` - registry and signal bus owner, one tick at a time
//! - `run_loop` - timer and interrupt driven tick loop of the binary

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod container;
pub mod run_loop;
pub mod supervisor;

pub use container::{default_services, AppConfig, ConfigError, FbtsConfig, StationConfig};
pub use supervisor::{Supervisor, SupervisorError, Tick};
