//! # FBTS Ingest Thread
//!
//! One blocking UDP receiver per station. Each datagram is decoded and
//! turned into session updates (written straight into the station's
//! [`SessionHandle`]) or inbox messages (applied by the dispatcher on the
//! main loop).
//!
//! ```text
//!  controller ──UDP──→ [recv_from] ──decode──→ StartSession ──→ SessionHandle
//!                           │                       └────────→ inbox: SsRequest("*101#")
//!                           │                  AuthenResponse ─→ inbox: AuthResponse
//!                           └── recv error ──────────────────→ inbox: IngestFailed
//! ```
//!
//! The socket has a receive timeout, so the process-wide quit flag and the
//! thread's own stop flag are seen within one timeout even without traffic.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use shared_types::{
    identity_digits, InboxSender, SessionHandle, StationInbound, SESSION_START_USSD,
};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{FbtsFrame, HEADER_LEN};
use crate::error::{FrameError, IngestError};
use crate::uplink::FbtsUplink;

/// Largest datagram read in one receive.
const MAX_DATAGRAM: usize = 2048;

/// Default receive timeout, bounding stop latency.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Socket settings shared by all ingest threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Local address to bind; all interfaces by default.
    pub bind_ip: IpAddr,
    /// Receive timeout.
    pub recv_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }
}

/// The station an ingest thread feeds.
#[derive(Debug, Clone)]
pub struct IngestTarget {
    /// Station name, for logs and the thread name.
    pub name: String,
    /// UDP port to bind.
    pub port: u16,
    /// Session context written on StartSession.
    pub session: SessionHandle,
    /// Inbox for work the main loop applies.
    pub inbox: InboxSender,
}

/// Handle to a running ingest thread.
#[derive(Debug)]
pub struct FbtsIngest {
    name: String,
    local_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    session: SessionHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FbtsIngest {
    /// Bind the socket and start the thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or configured, or the
    /// thread cannot be spawned. Nothing keeps running in that case.
    pub fn spawn(
        config: &IngestConfig,
        target: IngestTarget,
        quit: Arc<AtomicBool>,
    ) -> Result<Self, IngestError> {
        let addr = SocketAddr::new(config.bind_ip, target.port);
        let socket = UdpSocket::bind(addr).map_err(|source| IngestError::Bind { addr, source })?;
        let timeout = config.recv_timeout.max(Duration::from_millis(1));
        socket
            .set_read_timeout(Some(timeout))
            .map_err(IngestError::Configure)?;
        let local_addr = socket.local_addr().map_err(IngestError::Configure)?;
        let socket = Arc::new(socket);

        let stop = Arc::new(AtomicBool::new(false));
        let receiver = Receiver {
            name: target.name.clone(),
            socket: Arc::clone(&socket),
            session: Arc::clone(&target.session),
            inbox: target.inbox,
            quit,
            stop: Arc::clone(&stop),
        };
        let thread = thread::Builder::new()
            .name(format!("fbts-{}", target.name))
            .spawn(move || receiver.run())
            .map_err(IngestError::Spawn)?;

        info!(ms = %target.name, addr = %local_addr, "FBTS ingest started");
        Ok(Self {
            name: target.name,
            local_addr,
            socket,
            session: target.session,
            stop,
            thread: Some(thread),
        })
    }

    /// Ask the thread to exit; it notices within one receive timeout.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the thread and wait for it.
    pub fn join(mut self) {
        self.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(ms = %self.name, "FBTS thread panicked");
            }
        }
    }

    /// Bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender for replies to the station's controller, sharing this socket.
    #[must_use]
    pub fn uplink(&self) -> FbtsUplink {
        FbtsUplink::new(Arc::clone(&self.socket), Arc::clone(&self.session))
    }
}

impl Drop for FbtsIngest {
    fn drop(&mut self) {
        // Never leave a detached receiver behind.
        self.request_stop();
    }
}

/// State owned by the receiving thread.
struct Receiver {
    name: String,
    socket: Arc<UdpSocket>,
    session: SessionHandle,
    inbox: InboxSender,
    quit: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl Receiver {
    fn should_stop(&self) -> bool {
        self.quit.load(Ordering::Acquire) || self.stop.load(Ordering::Acquire)
    }

    fn run(self) {
        let mut buf = [0u8; MAX_DATAGRAM];
        while !self.should_stop() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if !self.handle(&buf[..len], from) {
                        break;
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    error!(ms = %self.name, error = %e, "FBTS receive failed");
                    let _ = self.inbox.send(StationInbound::IngestFailed {
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }
        debug!(ms = %self.name, "FBTS ingest stopped");
    }

    /// Process one datagram. Returns `false` once the station is gone.
    fn handle(&self, datagram: &[u8], from: SocketAddr) -> bool {
        if self.session.write().remember_peer(from) {
            info!(ms = %self.name, peer = %from, "FBTS controller address learned");
        }

        let frame = match FbtsFrame::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                self.log_rejected(datagram, from, &e);
                return true;
            }
        };

        match frame {
            FbtsFrame::StartSession { session_id, imsi } => {
                let imsi = identity_digits(&imsi);
                info!(ms = %self.name, session_id, %imsi, "FBTS session started");
                self.session.write().start_session(session_id, imsi);
                self.deliver(StationInbound::SsRequest {
                    ussd: SESSION_START_USSD.to_string(),
                    flags: 0,
                })
            }
            FbtsFrame::AuthenResponse { session_id, sres } => {
                debug!(ms = %self.name, session_id, sres = %hex::encode(sres), "FBTS auth response");
                self.deliver(StationInbound::AuthResponse { session_id, sres })
            }
            other => {
                debug!(ms = %self.name, tag = ?other.tag(), "FBTS frame ignored");
                true
            }
        }
    }

    fn deliver(&self, msg: StationInbound) -> bool {
        if self.inbox.send(msg).is_err() {
            warn!(ms = %self.name, "Station inbox closed, stopping FBTS ingest");
            return false;
        }
        true
    }

    fn log_rejected(&self, datagram: &[u8], from: SocketAddr, err: &FrameError) {
        let head = &datagram[..datagram.len().min(HEADER_LEN)];
        match err {
            FrameError::TooShort { .. } => {
                trace!(ms = %self.name, peer = %from, len = datagram.len(), "Short FBTS datagram");
            }
            FrameError::UnknownTag(tag) => {
                debug!(ms = %self.name, peer = %from, tag, "Unknown FBTS tag");
            }
            FrameError::LengthMismatch { .. } | FrameError::Truncated { .. } => {
                warn!(
                    ms = %self.name,
                    peer = %from,
                    len = datagram.len(),
                    header = %hex::encode(head),
                    error = %err,
                    "FBTS frame rejected"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{new_session_handle, station_inbox, InboxReceiver, TMSI_UNKNOWN};
    use std::time::Instant;

    fn loopback() -> IngestConfig {
        IngestConfig {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            recv_timeout: Duration::from_millis(20),
        }
    }

    fn spawn() -> (FbtsIngest, SessionHandle, InboxReceiver, Arc<AtomicBool>) {
        let session = new_session_handle();
        let (inbox, rx) = station_inbox();
        let quit = Arc::new(AtomicBool::new(false));
        let ingest = FbtsIngest::spawn(
            &loopback(),
            IngestTarget {
                name: "test".to_string(),
                port: 0,
                session: Arc::clone(&session),
                inbox,
            },
            Arc::clone(&quit),
        )
        .unwrap();
        (ingest, session, rx, quit)
    }

    fn controller() -> UdpSocket {
        UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap()
    }

    fn next_message(rx: &mut InboxReceiver) -> StationInbound {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(msg) = rx.try_next() {
                return msg;
            }
            assert!(Instant::now() < deadline, "no inbox message");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn start_session(session_id: u32) -> Vec<u8> {
        let mut imsi = [0u8; 16];
        imsi[..15].copy_from_slice(b"001010123456789");
        FbtsFrame::StartSession { session_id, imsi }.encode()
    }

    #[test]
    fn test_start_session_updates_context_and_queues_ussd() {
        let (ingest, session, mut rx, _quit) = spawn();
        session.write().tmsi = 0x1234;
        let ctl = controller();
        ctl.send_to(&start_session(42), ingest.local_addr()).unwrap();

        assert_eq!(
            next_message(&mut rx),
            StationInbound::SsRequest {
                ussd: "*101#".to_string(),
                flags: 0
            }
        );
        let ctx = session.read().clone();
        assert_eq!(ctx.session_id, 42);
        assert_eq!(ctx.imsi, "001010123456789");
        assert_eq!(ctx.tmsi, TMSI_UNKNOWN);
        assert_eq!(ctx.peer, Some(ctl.local_addr().unwrap()));
        ingest.join();
    }

    #[test]
    fn test_bad_length_changes_nothing() {
        let (ingest, session, mut rx, _quit) = spawn();
        let ctl = controller();
        let mut bad = start_session(7);
        bad[2] += 1;
        ctl.send_to(&bad, ingest.local_addr()).unwrap();
        // A valid frame afterwards proves the bad one was consumed.
        let auth = FbtsFrame::AuthenResponse {
            session_id: 1,
            sres: [9, 8, 7, 6],
        };
        ctl.send_to(&auth.encode(), ingest.local_addr()).unwrap();

        assert_eq!(
            next_message(&mut rx),
            StationInbound::AuthResponse {
                session_id: 1,
                sres: [9, 8, 7, 6]
            }
        );
        assert_eq!(session.read().session_id, 0);
        assert!(session.read().imsi.is_empty());
        ingest.join();
    }

    #[test]
    fn test_stop_without_traffic_is_bounded() {
        let (ingest, _session, _rx, _quit) = spawn();
        let started = Instant::now();
        ingest.request_stop();
        while !ingest.is_finished() {
            assert!(started.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(5));
        }
        ingest.join();
    }

    #[test]
    fn test_global_quit_stops_thread() {
        let (ingest, _session, _rx, quit) = spawn();
        quit.store(true, Ordering::Release);
        let started = Instant::now();
        while !ingest.is_finished() {
            assert!(started.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_closed_inbox_ends_thread() {
        let (ingest, _session, rx, _quit) = spawn();
        drop(rx);
        controller()
            .send_to(&start_session(1), ingest.local_addr())
            .unwrap();
        let started = Instant::now();
        while !ingest.is_finished() {
            assert!(started.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_bind_conflict_is_an_error() {
        let (ingest, _session, _rx, _quit) = spawn();
        let (inbox, _rx2) = station_inbox();
        let err = FbtsIngest::spawn(
            &loopback(),
            IngestTarget {
                name: "dup".to_string(),
                port: ingest.local_addr().port(),
                session: new_session_handle(),
                inbox,
            },
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Bind { .. }));
        ingest.join();
    }
}
