//! Call-control sink selection

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::settings::{ChannelCapability, MsSettings};
use crate::ports::CallControlHandler;

/// Where a station's call-control (MNCC) events go.
#[derive(Clone)]
pub enum CallControlSink {
    /// Handler supplied at process start, reached through a per-station
    /// rendezvous socket.
    External {
        handler: Arc<dyn CallControlHandler>,
        rendezvous: PathBuf,
    },
    /// Discards call control; the station cannot carry traffic channels.
    Dummy,
    /// Built-in call handling.
    Internal,
}

impl CallControlSink {
    /// Choose the sink for a new station.
    ///
    /// An external handler always wins; otherwise a signalling-only station
    /// gets the dummy sink.
    #[must_use]
    pub fn select(
        name: &str,
        settings: &MsSettings,
        external: Option<&Arc<dyn CallControlHandler>>,
    ) -> Self {
        match external {
            Some(handler) => Self::External {
                handler: Arc::clone(handler),
                rendezvous: Self::rendezvous_path(name),
            },
            None if settings.channel_capability == ChannelCapability::Sdcch => Self::Dummy,
            None => Self::Internal,
        }
    }

    /// Rendezvous path for a station's external call-control socket.
    #[must_use]
    pub fn rendezvous_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/ms_mncc_{name}"))
    }

    /// Open the rendezvous point, if external.
    pub fn attach(&self, name: &str) {
        if let Self::External {
            handler,
            rendezvous,
        } = self
        {
            match handler.attach(name, rendezvous) {
                Ok(()) => info!(ms = %name, path = ?rendezvous, "MNCC rendezvous open"),
                Err(e) => warn!(ms = %name, path = ?rendezvous, error = %e, "Cannot open MNCC rendezvous"),
            }
        }
    }

    /// Close the rendezvous point, if external.
    pub fn detach(&self, name: &str) {
        if let Self::External {
            handler,
            rendezvous,
        } = self
        {
            handler.detach(name, rendezvous);
        }
    }

    /// The rendezvous path, if external.
    #[must_use]
    pub fn rendezvous(&self) -> Option<&Path> {
        match self {
            Self::External { rendezvous, .. } => Some(rendezvous),
            _ => None,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::External { .. } => "external",
            Self::Dummy => "dummy",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Debug for CallControlSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External { rendezvous, .. } => f
                .debug_struct("External")
                .field("rendezvous", rendezvous)
                .finish_non_exhaustive(),
            Self::Dummy => f.write_str("Dummy"),
            Self::Internal => f.write_str("Internal"),
        }
    }
}
