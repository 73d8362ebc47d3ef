//! FBTS ingest threads behind the lifecycle's [`IngestLauncher`] port.
//!
//! Keeps the reply path of every running thread ([`FbtsIngestLauncher::uplink`]).
//! Nothing in this process originates FBTS replies yet: the loopback stack
//! never asks the controller for authentication or identity. The table is
//! the hook for a protocol stack that does.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ms_01_lifecycle::ports::{IngestHandle, IngestLauncher, IngestRequest};
use ms_02_fbts_ingest::{FbtsIngest, FbtsUplink, IngestConfig, IngestTarget};
use parking_lot::Mutex;
use shared_types::MsId;

type UplinkTable = Arc<Mutex<HashMap<MsId, FbtsUplink>>>;

/// Starts one [`FbtsIngest`] per powered-on station.
#[derive(Debug)]
pub struct FbtsIngestLauncher {
    config: IngestConfig,
    quit: Arc<AtomicBool>,
    uplinks: UplinkTable,
}

impl FbtsIngestLauncher {
    /// Launcher binding with `config`; every thread also watches `quit`.
    #[must_use]
    pub fn new(config: IngestConfig, quit: Arc<AtomicBool>) -> Self {
        Self {
            config,
            quit,
            uplinks: Arc::default(),
        }
    }

    /// Reply path of a station whose thread is running.
    ///
    /// Extension point for stacks that send `AuthenRequest` or `Identity`
    /// frames; unused by the runtime itself.
    #[must_use]
    pub fn uplink(&self, ms: MsId) -> Option<FbtsUplink> {
        self.uplinks.lock().get(&ms).cloned()
    }
}

impl IngestLauncher for FbtsIngestLauncher {
    fn launch(&self, request: IngestRequest) -> io::Result<Box<dyn IngestHandle>> {
        let target = IngestTarget {
            name: request.name,
            port: request.port,
            session: request.session,
            inbox: request.inbox,
        };
        let ingest = FbtsIngest::spawn(&self.config, target, Arc::clone(&self.quit))
            .map_err(io::Error::from)?;
        self.uplinks.lock().insert(request.ms, ingest.uplink());
        Ok(Box::new(FbtsIngestHandle {
            ms: request.ms,
            ingest,
            uplinks: Arc::clone(&self.uplinks),
        }))
    }
}

struct FbtsIngestHandle {
    ms: MsId,
    ingest: FbtsIngest,
    uplinks: UplinkTable,
}

impl IngestHandle for FbtsIngestHandle {
    fn request_stop(&self) {
        self.ingest.request_stop();
    }

    fn is_finished(&self) -> bool {
        self.ingest.is_finished()
    }

    fn join(self: Box<Self>) {
        let Self { ms, ingest, uplinks } = *self;
        uplinks.lock().remove(&ms);
        ingest.join();
    }

    fn local_addr(&self) -> SocketAddr {
        self.ingest.local_addr()
    }
}
