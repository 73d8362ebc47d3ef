//! SIM Access Profile client socket.
//!
//! The SAP message exchange itself belongs to the SIM layer; this adapter
//! only owns the connection so the lifecycle can open it on first reset and
//! close it when the station is reclaimed.

use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use ms_01_lifecycle::ports::{SimAccessConnector, SimAccessLink};
use tracing::debug;

/// Opens [`SapLink`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SapConnector;

impl SimAccessConnector for SapConnector {
    fn open(&self, path: &Path) -> io::Result<Box<dyn SimAccessLink>> {
        let stream = UnixStream::connect(path)?;
        stream.set_nonblocking(true)?;
        debug!(?path, "SAP socket connected");
        Ok(Box::new(SapLink {
            path: path.to_path_buf(),
            stream: Some(stream),
        }))
    }
}

/// Open SAP connection.
#[derive(Debug)]
pub struct SapLink {
    path: PathBuf,
    stream: Option<UnixStream>,
}

impl SapLink {
    /// Whether the connection is still held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl SimAccessLink for SapLink {
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(path = ?self.path, "SAP socket closed");
        }
    }
}

impl Drop for SapLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_open_then_close_reaches_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sap");
        let listener = UnixListener::bind(&path).unwrap();

        let mut link = SapConnector.open(&path).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        link.close();
        // Closing twice is harmless.
        link.close();

        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = SapConnector.open(&dir.path().join("nope")) else {
            panic!("opened a missing socket");
        };
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
