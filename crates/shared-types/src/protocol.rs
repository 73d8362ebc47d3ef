//! # Protocol Layer Taxonomy
//!
//! Names for the GSM protocol layers a station runs and the work queues the
//! dispatcher drains. The layers themselves live outside this workspace.

use std::fmt;

/// A protocol-layer subsystem with its own init/exit hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// SIM Access Profile client.
    SapClient,
    /// SIM job handling.
    Sim,
    /// Call Control (GSM 04.08).
    CallControl,
    /// Supplementary Services (GSM 04.80).
    SupplementaryServices,
    /// Short Message Service (GSM 04.11).
    ShortMessage,
    /// Voice / TCH frame handling.
    Voice,
    /// Subscriber identity management.
    Subscriber,
    /// Radio Resource (GSM 04.08).
    RadioResource,
    /// Mobility Management (GSM 04.08).
    MobilityManagement,
    /// PLMN and cell selection (GSM 03.22).
    PlmnSelection,
    /// LAPDm data-link channel.
    DataLink,
}

impl Layer {
    /// Order in which layers are brought up at power-on.
    pub const INIT_ORDER: [Layer; 11] = [
        Layer::DataLink,
        Layer::SapClient,
        Layer::Sim,
        Layer::CallControl,
        Layer::SupplementaryServices,
        Layer::ShortMessage,
        Layer::Voice,
        Layer::Subscriber,
        Layer::RadioResource,
        Layer::MobilityManagement,
        Layer::PlmnSelection,
    ];

    /// Order in which layers are shut down at teardown.
    ///
    /// The data-link channel is released last.
    pub const EXIT_ORDER: [Layer; 9] = [
        Layer::PlmnSelection,
        Layer::MobilityManagement,
        Layer::RadioResource,
        Layer::Subscriber,
        Layer::CallControl,
        Layer::SupplementaryServices,
        Layer::ShortMessage,
        Layer::Sim,
        Layer::DataLink,
    ];

    /// Short name used in log fields.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SapClient => "sap",
            Self::Sim => "sim",
            Self::CallControl => "cc",
            Self::SupplementaryServices => "ss",
            Self::ShortMessage => "sms",
            Self::Voice => "voice",
            Self::Subscriber => "subscr",
            Self::RadioResource => "rr",
            Self::MobilityManagement => "mm",
            Self::PlmnSelection => "plmn",
            Self::DataLink => "lapdm",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A non-blocking work queue polled by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkQueue {
    /// Radio signalling link messages from layer 2.
    RadioSignalling,
    /// Radio Resource messages.
    RadioResource,
    /// Mobility Management transaction messages.
    MmTransactions,
    /// Mobility Management registration messages.
    MmRegistration,
    /// Mobility Management events.
    MmEvents,
    /// PLMN selection state machine.
    PlmnSelection,
    /// Cell selection state machine.
    CellSelection,
    /// SIM jobs.
    SimJobs,
    /// Call-control messages.
    CallControl,
}

impl WorkQueue {
    /// Fixed order of one dispatch pass.
    pub const DISPATCH_ORDER: [WorkQueue; 9] = [
        WorkQueue::RadioSignalling,
        WorkQueue::RadioResource,
        WorkQueue::MmTransactions,
        WorkQueue::MmRegistration,
        WorkQueue::MmEvents,
        WorkQueue::PlmnSelection,
        WorkQueue::CellSelection,
        WorkQueue::SimJobs,
        WorkQueue::CallControl,
    ];
}
