//! # Core Domain Entities
//!
//! Station identity, the power-off ladder and the subscriber/session
//! context captured from FBTS traffic.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

/// TMSI value meaning "no TMSI allocated".
pub const TMSI_UNKNOWN: u32 = 0xffff_ffff;

/// Length of the IMSI field carried in FBTS frames.
pub const IMSI_FIELD_LEN: usize = 16;

/// Length of the IMEI field carried in FBTS identity frames.
pub const IMEI_FIELD_LEN: usize = 8;

/// Stable identifier of a mobile station inside the registry.
///
/// Ids are allocated in creation order and never reused, so ordering by id
/// is ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsId(pub u32);

impl fmt::Display for MsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ms#{}", self.0)
    }
}

/// Power-off progress of a mobile station.
///
/// ```text
/// [None] ──detach──→ [ImsiDetach] ──teardown──→ [AwaitingReset] ──reset──→ [Complete]
///    │                                                                       │
///    └───────────────── teardown (never started) ───────────────────────────→│
///    ↑                                                                       │
///    └──────────────────────────── power-on ─────────────────────────────────┘
/// ```
///
/// Variants are ordered so `<=` comparisons follow the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownState {
    /// Running, no shutdown in progress.
    None,
    /// Waiting for the network to acknowledge an IMSI detach.
    ImsiDetach,
    /// Layers are down, waiting for the radio to confirm a full reset.
    AwaitingReset,
    /// Fully powered off.
    Complete,
}

impl ShutdownState {
    /// Whether a transition from `self` to `next` keeps the ladder monotonic.
    ///
    /// The only backwards step is `Complete → None`, which is a new power-on.
    #[must_use]
    pub fn can_advance_to(self, next: ShutdownState) -> bool {
        match (self, next) {
            (Self::Complete, Self::None) => true,
            (from, to) => to > from,
        }
    }

    /// Short lowercase name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ImsiDetach => "imsi-detach",
            Self::AwaitingReset => "awaiting-reset",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber and session data written by an FBTS ingest thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Session id of the most recent StartSession.
    pub session_id: u32,
    /// IMSI digits as received (NUL padding stripped).
    pub imsi: String,
    /// Current TMSI, [`TMSI_UNKNOWN`] after a new session starts.
    pub tmsi: u32,
    /// Address of the first controller that sent us a datagram.
    pub peer: Option<SocketAddr>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            session_id: 0,
            imsi: String::new(),
            tmsi: TMSI_UNKNOWN,
            peer: None,
        }
    }
}

impl SessionContext {
    /// Record a new session, resetting the TMSI.
    pub fn start_session(&mut self, session_id: u32, imsi: String) {
        self.session_id = session_id;
        self.imsi = imsi;
        self.tmsi = TMSI_UNKNOWN;
    }

    /// Remember the sender, keeping the first one seen.
    ///
    /// Returns `true` if `addr` became the stored peer.
    pub fn remember_peer(&mut self, addr: SocketAddr) -> bool {
        if self.peer.is_some() {
            return false;
        }
        self.peer = Some(addr);
        true
    }
}

/// Shared handle to a station's [`SessionContext`].
///
/// The owning station and its ingest thread each hold a clone.
pub type SessionHandle = Arc<RwLock<SessionContext>>;

/// Create a fresh, empty session handle.
#[must_use]
pub fn new_session_handle() -> SessionHandle {
    Arc::new(RwLock::new(SessionContext::default()))
}

/// Decode a fixed-width, NUL-padded identity field into its digits.
#[must_use]
pub fn identity_digits(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
