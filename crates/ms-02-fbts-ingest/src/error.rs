//! Error types for FBTS framing and the ingest socket

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Why a datagram was not accepted as a frame.
///
/// Always recovered locally: the datagram is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the fixed header
    #[error("Datagram too short: {len} bytes")]
    TooShort { len: usize },

    /// Header length does not match the datagram
    #[error("Length mismatch: header says {declared}, body has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Body too short for the tag
    #[error("Truncated frame (tag {tag}): need {need} body bytes, got {got}")]
    Truncated { tag: u8, need: usize, got: usize },

    /// Tag outside the known set
    #[error("Unknown tag {0}")]
    UnknownTag(u8),
}

/// Failures starting or running an ingest thread.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The UDP socket could not be bound
    #[error("Failed to bind FBTS socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A socket option could not be set
    #[error("Failed to configure FBTS socket: {0}")]
    Configure(#[source] io::Error),

    /// The thread could not be spawned
    #[error("Failed to spawn FBTS thread: {0}")]
    Spawn(#[source] io::Error),
}

impl IngestError {
    /// Kind of the underlying socket error.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Bind { source, .. } | Self::Configure(source) | Self::Spawn(source) => {
                source.kind()
            }
        }
    }
}

impl From<IngestError> for io::Error {
    fn from(err: IngestError) -> Self {
        io::Error::new(err.kind(), err)
    }
}

/// Failures sending towards the controller.
#[derive(Debug, Error)]
pub enum UplinkError {
    /// No controller has sent anything yet
    #[error("No FBTS peer known yet")]
    NoPeer,

    /// The send itself failed
    #[error("Failed to send FBTS frame: {0}")]
    Send(#[from] io::Error),
}
