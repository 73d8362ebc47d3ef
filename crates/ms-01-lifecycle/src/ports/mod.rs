//! Ports (hexagonal boundaries)
//!
//! Everything a station talks to that is not part of this crate: the GSM
//! protocol layers, the layer-2 radio link, SIM access, the FBTS ingest
//! thread, call control and observability.

pub mod outbound;

pub use outbound::{
    CallControlHandler, IngestHandle, IngestLauncher, IngestRequest, L1Indication, ProtocolStack,
    RadioLink, RadioLinkConnector, SimAccessConnector, SimAccessLink, SimCard, StackFactory,
    StackRequest, StationObserver,
};
