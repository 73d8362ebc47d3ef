//! # Adapter Implementations
//!
//! Concrete implementations of the lifecycle's outbound ports.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ms-01-lifecycle                         │
//! │  StackFactory  RadioLinkConnector  SimAccessConnector  ...   │
//! └──────────────────────────────────────────────────────────────┘
//!         ↑                ↑                   ↑          ↑
//!  LoopbackStack     L1ctlConnector      SapConnector   FbtsIngestLauncher
//!                    (Unix socket)       (Unix socket)  (UDP thread)
//!                                                       MnccSocketHandler
//! ```

pub mod ingest;
pub mod l1ctl;
pub mod loopback;
pub mod mncc;
pub mod sap;

pub use ingest::FbtsIngestLauncher;
pub use l1ctl::{L1ctlConnector, L1ctlLink};
pub use loopback::{LoopbackStack, LoopbackStackFactory};
pub use mncc::MnccSocketHandler;
pub use sap::{SapConnector, SapLink};
