//! # L1CTL Radio Link
//!
//! Unix stream socket to the layer-1 process. Messages are length
//! prefixed:
//!
//! ```text
//! ┌──────────────┬──────────┬───────┬─────────┬─────────────┐
//! │ length (BE16)│ msg_type │ flags │ pad[2]  │ payload ... │
//! └──────────────┴──────────┴───────┴─────────┴─────────────┘
//!                └────────────── length bytes ─────────────┘
//! ```
//!
//! Only the reset messages matter here: `RESET_REQ` goes out, `RESET_IND`
//! and `RESET_CONF` come back as [`L1Indication::Reset`]. Everything else
//! read from the socket is skipped.
//!
//! The socket is non-blocking in both directions. Bytes the kernel does not
//! take at once stay queued and are flushed on later writes and polls, so a
//! frame is never cut short on the wire.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use ms_01_lifecycle::ports::{L1Indication, RadioLink, RadioLinkConnector};
use shared_bus::ResetKind;
use tracing::{debug, trace, warn};

/// `RESET_IND` message type.
pub const L1CTL_RESET_IND: u8 = 7;
/// `RESET_REQ` message type.
pub const L1CTL_RESET_REQ: u8 = 13;
/// `RESET_CONF` message type.
pub const L1CTL_RESET_CONF: u8 = 14;

const L1CTL_HDR_LEN: usize = 4;
const LENGTH_PREFIX: usize = 2;

/// Reset type codes carried in the reset payload.
fn reset_code(kind: ResetKind) -> u8 {
    match kind {
        ResetKind::Boot => 0,
        ResetKind::Full => 1,
        ResetKind::Scheduler => 2,
    }
}

fn reset_kind(code: u8) -> Option<ResetKind> {
    match code {
        0 => Some(ResetKind::Boot),
        1 => Some(ResetKind::Full),
        2 => Some(ResetKind::Scheduler),
        _ => None,
    }
}

/// Build a length-prefixed `RESET_REQ`.
#[must_use]
pub fn encode_reset_req(kind: ResetKind) -> Vec<u8> {
    let body = [L1CTL_RESET_REQ, 0, 0, 0, reset_code(kind), 0, 0, 0];
    let mut msg = Vec::with_capacity(LENGTH_PREFIX + body.len());
    msg.extend_from_slice(&(body.len() as u16).to_be_bytes());
    msg.extend_from_slice(&body);
    msg
}

/// Opens [`L1ctlLink`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct L1ctlConnector;

impl RadioLinkConnector for L1ctlConnector {
    fn open(&self, path: &Path) -> io::Result<Box<dyn RadioLink>> {
        let stream = UnixStream::connect(path)?;
        stream.set_nonblocking(true)?;
        debug!(?path, "L1CTL socket connected");
        Ok(Box::new(L1ctlLink::new(stream)))
    }
}

/// Non-blocking L1CTL connection.
#[derive(Debug)]
pub struct L1ctlLink {
    stream: Option<UnixStream>,
    rx: Vec<u8>,
    tx: Vec<u8>,
}

impl L1ctlLink {
    /// Wrap a connected, non-blocking stream.
    #[must_use]
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream: Some(stream),
            rx: Vec::new(),
            tx: Vec::new(),
        }
    }

    /// Bytes queued but not yet accepted by the socket.
    #[must_use]
    pub fn pending_tx(&self) -> usize {
        self.tx.len()
    }

    /// Write as much of the send queue as the socket takes.
    fn flush(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "L1CTL socket closed"));
        };
        while !self.tx.is_empty() {
            match stream.write(&self.tx) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.tx.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!(pending = self.tx.len(), "L1CTL send queue waiting");
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Read everything available into the receive buffer.
    fn fill(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let mut chunk = [0u8; 512];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    warn!("L1CTL socket closed by peer");
                    self.stream = None;
                    return;
                }
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "L1CTL read failed");
                    self.stream = None;
                    return;
                }
            }
        }
    }

    /// Pop one complete message (header and payload) from the buffer.
    fn next_message(&mut self) -> Option<Vec<u8>> {
        if self.rx.len() < LENGTH_PREFIX {
            return None;
        }
        let len = usize::from(u16::from_be_bytes([self.rx[0], self.rx[1]]));
        if self.rx.len() < LENGTH_PREFIX + len {
            return None;
        }
        let msg = self.rx[LENGTH_PREFIX..LENGTH_PREFIX + len].to_vec();
        self.rx.drain(..LENGTH_PREFIX + len);
        Some(msg)
    }
}

impl RadioLink for L1ctlLink {
    fn request_reset(&mut self, kind: ResetKind) -> io::Result<()> {
        if self.stream.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "L1CTL socket closed"));
        }
        self.tx.extend_from_slice(&encode_reset_req(kind));
        self.flush()?;
        debug!(?kind, "L1CTL reset requested");
        Ok(())
    }

    fn poll_indication(&mut self) -> Option<L1Indication> {
        if !self.tx.is_empty() {
            if let Err(e) = self.flush() {
                warn!(error = %e, "L1CTL write failed");
                self.stream = None;
                self.tx.clear();
            }
        }
        self.fill();
        while let Some(msg) = self.next_message() {
            if msg.len() < L1CTL_HDR_LEN {
                trace!(len = msg.len(), "Short L1CTL message skipped");
                continue;
            }
            let msg_type = msg[0];
            if msg_type != L1CTL_RESET_IND && msg_type != L1CTL_RESET_CONF {
                trace!(msg_type, "L1CTL message skipped");
                continue;
            }
            let kind = msg
                .get(L1CTL_HDR_LEN)
                .copied()
                .and_then(reset_kind)
                .unwrap_or(ResetKind::Full);
            return Some(L1Indication::Reset(kind));
        }
        None
    }

    fn close(&mut self) {
        self.tx.clear();
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("L1CTL socket closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::time::{Duration, Instant};

    fn reset_msg(msg_type: u8, code: u8) -> Vec<u8> {
        vec![0, 8, msg_type, 0, 0, 0, code, 0, 0, 0]
    }

    fn poll_until(link: &mut dyn RadioLink) -> Option<L1Indication> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(ind) = link.poll_indication() {
                return Some(ind);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_reset_req_layout() {
        assert_eq!(
            encode_reset_req(ResetKind::Full),
            vec![0, 8, 13, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn test_reset_roundtrip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l2");
        let listener = UnixListener::bind(&path).unwrap();

        let mut link = L1ctlConnector.open(&path).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        link.request_reset(ResetKind::Full).unwrap();
        let mut buf = [0u8; 10];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), encode_reset_req(ResetKind::Full));

        // Unrelated message first, then the confirmation split in two writes.
        peer.write_all(&[0, 4, 3, 0, 0, 0]).unwrap();
        let conf = reset_msg(L1CTL_RESET_CONF, 1);
        peer.write_all(&conf[..3]).unwrap();
        peer.write_all(&conf[3..]).unwrap();

        assert_eq!(
            poll_until(link.as_mut()),
            Some(L1Indication::Reset(ResetKind::Full))
        );
        link.close();
    }

    #[test]
    fn test_indications_from_buffered_bytes() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut link = L1ctlLink::new(a);

        b.write_all(&[0, 4, 3, 0, 0, 0]).unwrap();
        let ind = reset_msg(L1CTL_RESET_IND, 0);
        b.write_all(&ind[..5]).unwrap();
        assert_eq!(link.poll_indication(), None);
        b.write_all(&ind[5..]).unwrap();
        assert_eq!(poll_until(&mut link), Some(L1Indication::Reset(ResetKind::Boot)));

        b.write_all(&reset_msg(L1CTL_RESET_CONF, 1)).unwrap();
        assert_eq!(poll_until(&mut link), Some(L1Indication::Reset(ResetKind::Full)));
    }

    #[test]
    fn test_full_socket_keeps_frames_whole() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut link = L1ctlLink::new(a);

        let mut sent = 0usize;
        while link.pending_tx() == 0 {
            link.request_reset(ResetKind::Scheduler).unwrap();
            sent += 1;
            assert!(sent < 1_000_000, "socket never filled up");
        }

        let expected = sent * encode_reset_req(ResetKind::Scheduler).len();
        let reader = std::thread::spawn(move || {
            b.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut bytes = vec![0u8; expected];
            b.read_exact(&mut bytes).unwrap();
            bytes
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while link.pending_tx() > 0 && Instant::now() < deadline {
            link.poll_indication();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(link.pending_tx(), 0);

        let bytes = reader.join().unwrap();
        let frame = encode_reset_req(ResetKind::Scheduler);
        assert!(bytes.chunks(frame.len()).all(|chunk| chunk == frame.as_slice()));
    }

    #[test]
    fn test_peer_close_stops_link() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut link = L1ctlLink::new(a);
        drop(b);

        assert_eq!(poll_until(&mut link), None);
        assert!(link.request_reset(ResetKind::Full).is_err());
    }

    #[test]
    fn test_connect_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(L1ctlConnector.open(&dir.path().join("missing")).is_err());
    }
}
