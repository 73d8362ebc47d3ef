//! # Station Inbox Messages
//!
//! Messages an FBTS ingest thread hands to its owning station. They are
//! queued on an unbounded channel and applied by the Work Dispatcher on the
//! main loop, so protocol layers only observe them on a later drain pass.

use tokio::sync::mpsc;

use crate::errors::InboxClosed;

/// Unstructured supplementary-service string sent when a session starts.
pub const SESSION_START_USSD: &str = "*101#";

/// Kinds of Mobility Management events the application layer injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmEventKind {
    /// Start the IMSI detach procedure.
    ImsiDetach,
    /// Authentication response computed outside the stack.
    AuthResponse,
}

/// A Mobility Management event buffer.
///
/// Obtained zeroed from the stack's allocator, filled in, then submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmEvent {
    /// Event kind.
    pub kind: MmEventKind,
    /// SRES value, meaningful for [`MmEventKind::AuthResponse`].
    pub sres: [u8; 4],
}

impl MmEvent {
    /// A zeroed event of the given kind.
    #[must_use]
    pub fn new(kind: MmEventKind) -> Self {
        Self { kind, sres: [0; 4] }
    }
}

/// Work queued for a station by its ingest thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationInbound {
    /// Send an unstructured SS request (USSD) through the SS layer.
    SsRequest {
        /// USSD string, e.g. `*101#`.
        ussd: String,
        /// SS request flags passed through to the layer.
        flags: u32,
    },
    /// Inject an authentication response into Mobility Management.
    AuthResponse {
        /// Session the response belongs to.
        session_id: u32,
        /// SRES bytes, unmodified from the wire.
        sres: [u8; 4],
    },
    /// The ingest thread stopped because its socket failed.
    IngestFailed {
        /// Human-readable cause.
        reason: String,
    },
}

/// Sending half of a station inbox.
#[derive(Debug, Clone)]
pub struct InboxSender(mpsc::UnboundedSender<StationInbound>);

impl InboxSender {
    /// Queue a message for the owning station.
    pub fn send(&self, msg: StationInbound) -> Result<(), InboxClosed> {
        self.0.send(msg).map_err(|_| InboxClosed)
    }
}

/// Receiving half of a station inbox, drained on the main loop.
#[derive(Debug)]
pub struct InboxReceiver(mpsc::UnboundedReceiver<StationInbound>);

impl InboxReceiver {
    /// Take the next queued message without blocking.
    pub fn try_next(&mut self) -> Option<StationInbound> {
        self.0.try_recv().ok()
    }
}

/// Create a connected inbox pair.
#[must_use]
pub fn station_inbox() -> (InboxSender, InboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender(tx), InboxReceiver(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_preserves_order() {
        let (tx, mut rx) = station_inbox();
        tx.send(StationInbound::SsRequest {
            ussd: SESSION_START_USSD.to_string(),
            flags: 0,
        })
        .unwrap();
        tx.send(StationInbound::AuthResponse {
            session_id: 1,
            sres: [1, 2, 3, 4],
        })
        .unwrap();

        assert!(matches!(rx.try_next(), Some(StationInbound::SsRequest { .. })));
        assert!(matches!(
            rx.try_next(),
            Some(StationInbound::AuthResponse { sres: [1, 2, 3, 4], .. })
        ));
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = station_inbox();
        drop(rx);
        let err = tx
            .send(StationInbound::IngestFailed {
                reason: "gone".to_string(),
            })
            .unwrap_err();
        assert_eq!(err, InboxClosed);
    }

    #[test]
    fn test_new_event_is_zeroed() {
        let event = MmEvent::new(MmEventKind::AuthResponse);
        assert_eq!(event.sres, [0; 4]);
    }
}
