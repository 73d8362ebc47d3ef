//! # Loopback Protocol Stack
//!
//! Stand-in for the GSM layers when no real stack is linked in. Every hook
//! queues a job on the work queue the real layer would use; each dequeue
//! runs one job and logs it. An IMSI detach finishes on the spot, so a
//! graceful power-off walks the whole shutdown state machine.
//!
//! ```text
//!  ss_request ───────→ MmTransactions
//!  mm_event_submit ──→ MmEvents ──(ImsiDetach)──→ DetachComplete
//!  insert_sim ───────→ SimJobs
//!  switch_on ────────→ PlmnSelection + CellSelection
//!  on_radio_reset ───→ CellSelection
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use ms_01_lifecycle::ports::{ProtocolStack, SimCard, StackFactory, StackRequest};
use ms_01_lifecycle::{CallControlSink, MsSettings};
use shared_types::{Layer, MmEvent, MmEventKind, WorkQueue};
use tracing::{debug, info, trace};

/// One unit of queued work.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Job {
    MmEvent(MmEvent),
    SsRequest { ussd: String, flags: u32 },
    InsertSim(SimCard),
    PlmnSwitchOn,
    CellSearch,
}

/// In-process stack that only records and logs.
#[derive(Debug)]
pub struct LoopbackStack {
    name: String,
    layers: HashSet<Layer>,
    queues: HashMap<WorkQueue, VecDeque<Job>>,
    requests: VecDeque<StackRequest>,
}

impl LoopbackStack {
    /// Empty stack for station `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: HashSet::new(),
            queues: HashMap::new(),
            requests: VecDeque::new(),
        }
    }

    /// Whether `layer` has been initialised and not yet exited.
    #[must_use]
    pub fn is_up(&self, layer: Layer) -> bool {
        self.layers.contains(&layer)
    }

    /// Jobs waiting on `queue`.
    #[must_use]
    pub fn pending(&self, queue: WorkQueue) -> usize {
        self.queues.get(&queue).map_or(0, VecDeque::len)
    }

    fn push(&mut self, queue: WorkQueue, job: Job) {
        self.queues.entry(queue).or_default().push_back(job);
    }

    fn run(&mut self, queue: WorkQueue, job: Job) {
        match job {
            Job::MmEvent(event) => match event.kind {
                MmEventKind::ImsiDetach => {
                    info!(ms = %self.name, "IMSI detach done");
                    self.requests.push_back(StackRequest::DetachComplete);
                }
                MmEventKind::AuthResponse => {
                    info!(ms = %self.name, sres = %hex::encode(event.sres), "Authentication response");
                }
            },
            Job::SsRequest { ussd, flags } => {
                info!(ms = %self.name, %ussd, flags, "SS request");
            }
            Job::InsertSim(card) => {
                info!(ms = %self.name, ?card, "SIM inserted");
            }
            Job::PlmnSwitchOn => debug!(ms = %self.name, "PLMN selection switched on"),
            Job::CellSearch => debug!(ms = %self.name, ?queue, "Cell search"),
        }
    }
}

impl ProtocolStack for LoopbackStack {
    fn init(&mut self, layer: Layer) {
        trace!(ms = %self.name, %layer, "Layer init");
        self.layers.insert(layer);
    }

    fn exit(&mut self, layer: Layer) {
        trace!(ms = %self.name, %layer, "Layer exit");
        self.layers.remove(&layer);
        if layer == Layer::DataLink {
            self.queues.clear();
        }
    }

    fn dequeue(&mut self, queue: WorkQueue) -> bool {
        let Some(job) = self.queues.get_mut(&queue).and_then(VecDeque::pop_front) else {
            return false;
        };
        self.run(queue, job);
        true
    }

    fn mm_event_alloc(&mut self, kind: MmEventKind) -> Option<MmEvent> {
        Some(MmEvent::new(kind))
    }

    fn mm_event_submit(&mut self, event: MmEvent) {
        self.push(WorkQueue::MmEvents, Job::MmEvent(event));
    }

    fn ss_request(&mut self, ussd: &str, flags: u32) {
        self.push(
            WorkQueue::MmTransactions,
            Job::SsRequest {
                ussd: ussd.to_string(),
                flags,
            },
        );
    }

    fn switch_on(&mut self) {
        self.push(WorkQueue::PlmnSelection, Job::PlmnSwitchOn);
        self.push(WorkQueue::CellSelection, Job::CellSearch);
    }

    fn insert_sim(&mut self, card: SimCard) {
        self.push(WorkQueue::SimJobs, Job::InsertSim(card));
    }

    fn on_radio_reset(&mut self) {
        self.push(WorkQueue::CellSelection, Job::CellSearch);
    }

    fn take_request(&mut self) -> Option<StackRequest> {
        self.requests.pop_front()
    }
}

/// Builds a [`LoopbackStack`] per station.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackStackFactory;

impl StackFactory for LoopbackStackFactory {
    fn create(
        &self,
        name: &str,
        _settings: &MsSettings,
        call_control: &CallControlSink,
    ) -> Box<dyn ProtocolStack> {
        debug!(ms = %name, call_control = call_control.kind(), "Loopback stack created");
        Box::new(LoopbackStack::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stack: &mut LoopbackStack) -> usize {
        let mut runs = 0;
        loop {
            let mut work = false;
            for queue in WorkQueue::DISPATCH_ORDER {
                if stack.dequeue(queue) {
                    work = true;
                    runs += 1;
                }
            }
            if !work {
                return runs;
            }
        }
    }

    #[test]
    fn test_detach_raises_request_after_dequeue() {
        let mut stack = LoopbackStack::new("1");
        let event = stack.mm_event_alloc(MmEventKind::ImsiDetach).unwrap();
        stack.mm_event_submit(event);
        assert_eq!(stack.take_request(), None);

        assert!(stack.dequeue(WorkQueue::MmEvents));
        assert_eq!(stack.take_request(), Some(StackRequest::DetachComplete));
        assert_eq!(stack.take_request(), None);
    }

    #[test]
    fn test_auth_response_raises_nothing() {
        let mut stack = LoopbackStack::new("1");
        let mut event = stack.mm_event_alloc(MmEventKind::AuthResponse).unwrap();
        event.sres = [1, 2, 3, 4];
        stack.mm_event_submit(event);
        assert_eq!(drain(&mut stack), 1);
        assert_eq!(stack.take_request(), None);
    }

    #[test]
    fn test_switch_on_queues_selection_work() {
        let mut stack = LoopbackStack::new("1");
        stack.switch_on();
        assert_eq!(stack.pending(WorkQueue::PlmnSelection), 1);
        assert_eq!(stack.pending(WorkQueue::CellSelection), 1);
        assert_eq!(drain(&mut stack), 2);
        assert!(!stack.dequeue(WorkQueue::CellSelection));
    }

    #[test]
    fn test_jobs_land_on_their_queues() {
        let mut stack = LoopbackStack::new("1");
        stack.ss_request("*101#", 0);
        stack.insert_sim(SimCard::Reader);
        stack.on_radio_reset();
        assert_eq!(stack.pending(WorkQueue::MmTransactions), 1);
        assert_eq!(stack.pending(WorkQueue::SimJobs), 1);
        assert_eq!(stack.pending(WorkQueue::CellSelection), 1);
        assert_eq!(drain(&mut stack), 3);
    }

    #[test]
    fn test_layers_and_data_link_exit_drops_work() {
        let mut stack = LoopbackStack::new("1");
        for layer in Layer::INIT_ORDER {
            stack.init(layer);
        }
        assert!(stack.is_up(Layer::MobilityManagement));
        stack.ss_request("*101#", 0);

        for layer in Layer::EXIT_ORDER {
            stack.exit(layer);
        }
        assert!(!stack.is_up(Layer::MobilityManagement));
        // Voice and SAP have no exit hook.
        assert!(stack.is_up(Layer::Voice));
        assert_eq!(stack.pending(WorkQueue::MmTransactions), 0);
    }

    #[test]
    fn test_factory_builds_fresh_stack() {
        let settings = MsSettings::default();
        let mut stack = LoopbackStackFactory.create("7", &settings, &CallControlSink::Internal);
        assert!(!stack.dequeue(WorkQueue::MmEvents));
        assert_eq!(stack.take_request(), None);
    }
}
