//! # Shared Types Crate
//!
//! Value types that cross crate boundaries in the mobile-station runtime.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: station ids, the shutdown ladder and the
//!   FBTS session context are defined once, here.
//! - **Thread Boundary**: the only types an FBTS ingest thread shares with
//!   the main loop are [`SessionHandle`] and [`StationInbound`].

pub mod entities;
pub mod errors;
pub mod ipc;
pub mod protocol;

pub use entities::*;
pub use errors::*;
pub use ipc::*;
pub use protocol::*;
