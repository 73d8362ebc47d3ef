//! # Runtime Container
//!
//! Configuration and the wiring of default adapters into the lifecycle
//! registry's services.

pub mod config;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ms_01_lifecycle::ports::CallControlHandler;
use ms_01_lifecycle::services::LogObserver;
use ms_01_lifecycle::StationServices;

use crate::adapters::{
    FbtsIngestLauncher, L1ctlConnector, LoopbackStackFactory, MnccSocketHandler, SapConnector,
};

pub use config::{AppConfig, ConfigError, FbtsConfig, StationConfig};

/// Services backed by the production adapters.
///
/// `quit` is the process-wide flag every ingest thread watches. With
/// `external_mncc` each station gets a call-control rendezvous socket.
#[must_use]
pub fn default_services(
    config: &AppConfig,
    quit: Arc<AtomicBool>,
    external_mncc: bool,
) -> StationServices {
    let call_control = external_mncc
        .then(|| Arc::new(MnccSocketHandler::default()) as Arc<dyn CallControlHandler>);
    StationServices {
        stacks: Arc::new(LoopbackStackFactory),
        radio: Arc::new(L1ctlConnector),
        sim_access: Arc::new(SapConnector),
        ingest: Arc::new(FbtsIngestLauncher::new(config.fbts.ingest_config(), quit)),
        observer: Arc::new(LogObserver),
        call_control,
    }
}
