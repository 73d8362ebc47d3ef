//! Error types for the lifecycle subsystem

use std::io;
use std::path::PathBuf;

use shared_types::{MmEventKind, MsId, ShutdownState};
use thiserror::Error;

/// Errors returned by power-on.
#[derive(Debug, Error)]
pub enum StartError {
    /// No station with this id is registered
    #[error("Unknown station {0}")]
    UnknownStation(MsId),

    /// Power-on requires a fully powered-off station
    #[error("Station is not powered off (shutdown state {state})")]
    NotStopped { state: ShutdownState },

    /// The ingest thread of the previous power cycle has not exited yet
    #[error("FBTS ingest of the previous run is still stopping, retry later")]
    IngestRunning,

    /// Another live station already uses the radio-link socket
    #[error("MS '{other}' uses the same layer2 socket, shut it down first")]
    DuplicateRadioLink { other: String },

    /// Another live station already uses the SIM-access socket
    #[error("MS '{other}' uses the same SAP socket, shut it down first")]
    DuplicateSimAccess { other: String },

    /// The radio-link connection could not be opened
    #[error("Failed to open layer2 socket {path:?}: {source}")]
    RadioLinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The FBTS socket could not be created or bound
    #[error("FBTS ingest failed to start: {0}")]
    Ingest(#[source] io::Error),
}

/// Errors returned by power-off and delete.
#[derive(Debug, Error)]
pub enum StopError {
    /// No station with this id is registered
    #[error("Unknown station {0}")]
    UnknownStation(MsId),

    /// The protocol stack could not allocate an event
    #[error("Failed to allocate {kind:?} event")]
    EventAllocation { kind: MmEventKind },
}

/// Any lifecycle failure.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Stop(#[from] StopError),
}

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;
