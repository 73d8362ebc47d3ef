//! Driven Ports (SPI - Outbound Dependencies)
//!
//! All hooks are synchronous and must not block: they are called from the
//! single-threaded main loop.

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use shared_bus::ResetKind;
use shared_types::{InboxSender, Layer, MmEvent, MmEventKind, MsId, SessionHandle, ShutdownState, WorkQueue};

use crate::domain::{CallControlSink, MsSettings, TestCardSettings};

/// Card handed to the subscriber layer on first reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCard {
    /// Physical card behind the layer-1 SIM reader.
    Reader,
    /// Built-in test card.
    Test(TestCardSettings),
    /// Remote card over the SIM Access Profile.
    Sap,
}

/// Requests the protocol stack raises towards the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackRequest {
    /// The IMSI detach procedure finished (or timed out); tear down now.
    DetachComplete,
}

/// The GSM protocol layers of one station (RR/MM/CC/SS/SMS/SIM).
///
/// Implemented outside this crate; one instance per station.
pub trait ProtocolStack: Send {
    /// Bring up one layer.
    fn init(&mut self, layer: Layer);

    /// Shut down one layer.
    fn exit(&mut self, layer: Layer);

    /// Process at most a batch of one queue; `true` if anything was done.
    fn dequeue(&mut self, queue: WorkQueue) -> bool;

    /// Allocate a zeroed MM event; `None` when out of buffers.
    fn mm_event_alloc(&mut self, kind: MmEventKind) -> Option<MmEvent>;

    /// Queue an MM event for the next `MmEvents` dequeue.
    fn mm_event_submit(&mut self, event: MmEvent);

    /// Start an unstructured SS request.
    fn ss_request(&mut self, ussd: &str, flags: u32);

    /// Kick PLMN and cell selection with SWITCH_ON (no SIM configured).
    fn switch_on(&mut self);

    /// Insert a SIM card into the subscriber layer.
    fn insert_sim(&mut self, card: SimCard);

    /// Layer 1 was reset; forwarded to cell selection.
    fn on_radio_reset(&mut self) {}

    /// Take the next pending request for the lifecycle, if any.
    fn take_request(&mut self) -> Option<StackRequest> {
        None
    }
}

/// Creates a protocol stack for a new station.
pub trait StackFactory: Send + Sync {
    /// Build the stack for a station with these settings and call-control sink.
    fn create(&self, name: &str, settings: &MsSettings, call_control: &CallControlSink)
        -> Box<dyn ProtocolStack>;
}

/// Indications read from the radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L1Indication {
    /// Layer 1 reports a completed reset.
    Reset(ResetKind),
}

/// Connection to the layer-1/layer-2 process of a station.
pub trait RadioLink: Send {
    /// Ask layer 1 to reset.
    fn request_reset(&mut self, kind: ResetKind) -> io::Result<()>;

    /// Read the next indication without blocking.
    fn poll_indication(&mut self) -> Option<L1Indication>;

    /// Close the connection.
    fn close(&mut self);
}

/// Opens radio links by socket path.
pub trait RadioLinkConnector: Send + Sync {
    /// Open the layer-2 socket at `path`.
    fn open(&self, path: &Path) -> io::Result<Box<dyn RadioLink>>;
}

/// Connection to a remote SIM over SAP.
pub trait SimAccessLink: Send {
    /// Close the connection.
    fn close(&mut self);
}

/// Opens SIM-access connections by socket path.
pub trait SimAccessConnector: Send + Sync {
    /// Open the SAP socket at `path`.
    fn open(&self, path: &Path) -> io::Result<Box<dyn SimAccessLink>>;
}

/// Everything an FBTS ingest thread needs from its station.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Owning station.
    pub ms: MsId,
    /// Station name, for logs.
    pub name: String,
    /// UDP port to bind on all interfaces.
    pub port: u16,
    /// Session context the thread writes.
    pub session: SessionHandle,
    /// Inbox the thread queues work into.
    pub inbox: InboxSender,
}

/// A running FBTS ingest thread.
pub trait IngestHandle: Send {
    /// Ask the thread to stop after its current receive.
    fn request_stop(&self);

    /// Whether the thread has exited.
    fn is_finished(&self) -> bool;

    /// Wait for the thread to exit.
    fn join(self: Box<Self>);

    /// Bound socket address.
    fn local_addr(&self) -> SocketAddr;
}

/// Starts FBTS ingest threads.
pub trait IngestLauncher: Send + Sync {
    /// Bind the socket and start the thread.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the socket cannot be created or bound.
    fn launch(&self, request: IngestRequest) -> io::Result<Box<dyn IngestHandle>>;
}

/// External call-control (MNCC) handler supplied at process start.
pub trait CallControlHandler: Send + Sync {
    /// Open the rendezvous point for a station.
    fn attach(&self, name: &str, rendezvous: &Path) -> io::Result<()>;

    /// Close the rendezvous point of a station.
    fn detach(&self, name: &str, rendezvous: &Path);
}

/// Observability sink for lifecycle changes.
pub trait StationObserver: Send + Sync {
    /// The station's `started` flag changed.
    fn notify_started(&self, ms: MsId, name: &str, started: bool);

    /// The station's shutdown state changed.
    fn notify_shutdown(&self, ms: MsId, name: &str, old: ShutdownState, new: ShutdownState);
}
