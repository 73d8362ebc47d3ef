//! Outbound collaborators shared by every station, plus the default
//! logging observer.

use std::sync::Arc;

use shared_types::{MsId, ShutdownState};
use tracing::info;

use crate::ports::{
    CallControlHandler, IngestLauncher, RadioLinkConnector, SimAccessConnector, StackFactory,
    StationObserver,
};

/// Adapters a registry hands to its stations.
#[derive(Clone)]
pub struct StationServices {
    /// Builds one protocol stack per station.
    pub stacks: Arc<dyn StackFactory>,
    /// Opens layer-2 radio links.
    pub radio: Arc<dyn RadioLinkConnector>,
    /// Opens SAP connections.
    pub sim_access: Arc<dyn SimAccessConnector>,
    /// Starts FBTS ingest threads.
    pub ingest: Arc<dyn IngestLauncher>,
    /// Receives started/shutdown notifications.
    pub observer: Arc<dyn StationObserver>,
    /// External call-control handler, if one was supplied at start.
    pub call_control: Option<Arc<dyn CallControlHandler>>,
}

impl std::fmt::Debug for StationServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationServices")
            .field("external_call_control", &self.call_control.is_some())
            .finish_non_exhaustive()
    }
}

/// Observer that writes lifecycle changes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StationObserver for LogObserver {
    fn notify_started(&self, ms: MsId, name: &str, started: bool) {
        info!(%ms, ms_name = %name, started, "MS started flag changed");
    }

    fn notify_shutdown(&self, ms: MsId, name: &str, old: ShutdownState, new: ShutdownState) {
        info!(%ms, ms_name = %name, %old, %new, "MS shutdown state changed");
    }
}
