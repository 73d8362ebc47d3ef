//! # External Call-Control Sockets
//!
//! With external call control every station exposes a Unix listening
//! socket at its rendezvous path (`/tmp/ms_mncc_<name>`). A call-control
//! application connects there instead of the built-in handler.
//!
//! Accepting connections and speaking MNCC is the call-control layer's job;
//! this handler owns the listening socket and its filesystem entry.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::net::UnixListener;
use std::path::Path;

use ms_01_lifecycle::ports::CallControlHandler;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Listening sockets by station name.
#[derive(Debug, Default)]
pub struct MnccSocketHandler {
    listeners: Mutex<HashMap<String, UnixListener>>,
}

impl MnccSocketHandler {
    /// Number of stations currently attached.
    #[must_use]
    pub fn attached(&self) -> usize {
        self.listeners.lock().len()
    }

    fn remove_file(path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(?path, error = %e, "Failed to remove MNCC socket"),
        }
    }
}

impl CallControlHandler for MnccSocketHandler {
    fn attach(&self, name: &str, rendezvous: &Path) -> io::Result<()> {
        // A previous run may have left the socket file behind.
        Self::remove_file(rendezvous);
        let listener = UnixListener::bind(rendezvous)?;
        listener.set_nonblocking(true)?;
        debug!(ms = %name, path = ?rendezvous, "MNCC socket listening");
        if self
            .listeners
            .lock()
            .insert(name.to_string(), listener)
            .is_some()
        {
            warn!(ms = %name, "MNCC socket replaced an existing one");
        }
        Ok(())
    }

    fn detach(&self, name: &str, rendezvous: &Path) {
        if self.listeners.lock().remove(name).is_some() {
            Self::remove_file(rendezvous);
            debug!(ms = %name, path = ?rendezvous, "MNCC socket closed");
        }
    }
}
