//! Recording mocks for the outbound ports.
//!
//! Every mock keeps its state behind a shared lock so tests can inspect and
//! steer it while the registry owns the boxed port objects.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_bus::ResetKind;
use shared_types::{Layer, MmEvent, MmEventKind, MsId, ShutdownState, WorkQueue};

use crate::domain::{CallControlSink, MsSettings};
use crate::ports::{
    CallControlHandler, IngestHandle, IngestLauncher, IngestRequest, L1Indication, ProtocolStack,
    RadioLink, RadioLinkConnector, SimAccessConnector, SimAccessLink, SimCard, StackFactory,
    StackRequest, StationObserver,
};
use crate::services::StationServices;

// ============================================================================
// Protocol stack
// ============================================================================

/// One call made into a [`MockStack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    Init(Layer),
    Exit(Layer),
    Dequeue(WorkQueue),
    MmEvent(MmEvent),
    SsRequest(String, u32),
    SwitchOn,
    InsertSim(SimCard),
    RadioReset,
}

/// Shared state of one mock stack.
#[derive(Debug)]
pub struct MockStackState {
    /// Every call, in order.
    pub calls: Vec<StackCall>,
    /// Items waiting per queue; each dequeue takes one.
    pub pending: HashMap<WorkQueue, usize>,
    /// Make `mm_event_alloc` fail.
    pub alloc_fails: bool,
    /// Answer a processed IMSI detach with [`StackRequest::DetachComplete`].
    pub answer_detach: bool,
    /// Submitted MM events not yet dequeued.
    pub mm_events: VecDeque<MmEvent>,
    /// Requests waiting for the lifecycle.
    pub requests: VecDeque<StackRequest>,
}

impl Default for MockStackState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            pending: HashMap::new(),
            alloc_fails: false,
            answer_detach: true,
            mm_events: VecDeque::new(),
            requests: VecDeque::new(),
        }
    }
}

impl MockStackState {
    pub fn inits(&self) -> Vec<Layer> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StackCall::Init(l) => Some(*l),
                _ => None,
            })
            .collect()
    }

    pub fn exits(&self) -> Vec<Layer> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StackCall::Exit(l) => Some(*l),
                _ => None,
            })
            .collect()
    }

    pub fn dequeues(&self) -> Vec<WorkQueue> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StackCall::Dequeue(q) => Some(*q),
                _ => None,
            })
            .collect()
    }

    /// MM events submitted so far.
    pub fn mm_events_submitted(&self) -> Vec<MmEvent> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StackCall::MmEvent(ev) => Some(ev.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Protocol stack that records every call.
pub struct MockStack {
    state: Arc<Mutex<MockStackState>>,
}

impl ProtocolStack for MockStack {
    fn init(&mut self, layer: Layer) {
        self.state.lock().calls.push(StackCall::Init(layer));
    }

    fn exit(&mut self, layer: Layer) {
        self.state.lock().calls.push(StackCall::Exit(layer));
    }

    fn dequeue(&mut self, queue: WorkQueue) -> bool {
        let mut state = self.state.lock();
        state.calls.push(StackCall::Dequeue(queue));

        if queue == WorkQueue::MmEvents {
            if let Some(event) = state.mm_events.pop_front() {
                if event.kind == MmEventKind::ImsiDetach && state.answer_detach {
                    state.requests.push_back(StackRequest::DetachComplete);
                }
                return true;
            }
        }

        match state.pending.get_mut(&queue) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    fn mm_event_alloc(&mut self, kind: MmEventKind) -> Option<MmEvent> {
        if self.state.lock().alloc_fails {
            return None;
        }
        Some(MmEvent::new(kind))
    }

    fn mm_event_submit(&mut self, event: MmEvent) {
        let mut state = self.state.lock();
        state.calls.push(StackCall::MmEvent(event.clone()));
        state.mm_events.push_back(event);
    }

    fn ss_request(&mut self, ussd: &str, flags: u32) {
        self.state
            .lock()
            .calls
            .push(StackCall::SsRequest(ussd.to_string(), flags));
    }

    fn switch_on(&mut self) {
        self.state.lock().calls.push(StackCall::SwitchOn);
    }

    fn insert_sim(&mut self, card: SimCard) {
        self.state.lock().calls.push(StackCall::InsertSim(card));
    }

    fn on_radio_reset(&mut self) {
        self.state.lock().calls.push(StackCall::RadioReset);
    }

    fn take_request(&mut self) -> Option<StackRequest> {
        self.state.lock().requests.pop_front()
    }
}

/// Factory handing out [`MockStack`]s keyed by station name.
#[derive(Default)]
pub struct MockStackFactory {
    states: Mutex<HashMap<String, Arc<Mutex<MockStackState>>>>,
}

impl MockStackFactory {
    /// State of the stack for `name`, created on first use.
    pub fn state(&self, name: &str) -> Arc<Mutex<MockStackState>> {
        Arc::clone(self.states.lock().entry(name.to_string()).or_default())
    }
}

impl StackFactory for MockStackFactory {
    fn create(
        &self,
        name: &str,
        _settings: &MsSettings,
        _call_control: &CallControlSink,
    ) -> Box<dyn ProtocolStack> {
        Box::new(MockStack {
            state: self.state(name),
        })
    }
}

// ============================================================================
// Radio link
// ============================================================================

#[derive(Default)]
struct RadioInner {
    fail_open: bool,
    auto_ack: bool,
    opened: Vec<PathBuf>,
    queues: Vec<VecDeque<L1Indication>>,
    resets: Vec<ResetKind>,
    closes: usize,
}

/// Radio-link connector whose links record reset requests.
#[derive(Default)]
pub struct MockRadioConnector {
    inner: Arc<Mutex<RadioInner>>,
}

impl MockRadioConnector {
    /// Make subsequent opens fail.
    pub fn fail_open(&self, fail: bool) {
        self.inner.lock().fail_open = fail;
    }

    /// Answer every reset request with a reset indication.
    pub fn auto_ack(&self, on: bool) {
        self.inner.lock().auto_ack = on;
    }

    /// Queue an indication on the most recently opened link.
    pub fn inject(&self, indication: L1Indication) {
        if let Some(queue) = self.inner.lock().queues.last_mut() {
            queue.push_back(indication);
        }
    }

    /// Every reset requested over any link.
    pub fn resets(&self) -> Vec<ResetKind> {
        self.inner.lock().resets.clone()
    }

    /// Paths opened so far.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.inner.lock().opened.clone()
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().closes
    }
}

impl RadioLinkConnector for MockRadioConnector {
    fn open(&self, path: &Path) -> io::Result<Box<dyn RadioLink>> {
        let mut inner = self.inner.lock();
        if inner.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "layer2 not running",
            ));
        }
        inner.opened.push(path.to_path_buf());
        inner.queues.push(VecDeque::new());
        Ok(Box::new(MockRadioLink {
            inner: Arc::clone(&self.inner),
            index: inner.queues.len() - 1,
        }))
    }
}

struct MockRadioLink {
    inner: Arc<Mutex<RadioInner>>,
    index: usize,
}

impl RadioLink for MockRadioLink {
    fn request_reset(&mut self, kind: ResetKind) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.resets.push(kind);
        if inner.auto_ack {
            inner.queues[self.index].push_back(L1Indication::Reset(kind));
        }
        Ok(())
    }

    fn poll_indication(&mut self) -> Option<L1Indication> {
        self.inner.lock().queues[self.index].pop_front()
    }

    fn close(&mut self) {
        self.inner.lock().closes += 1;
    }
}

// ============================================================================
// SIM access
// ============================================================================

/// SIM-access connector counting opens and closes.
#[derive(Default)]
pub struct MockSimAccess {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockSimAccess {
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl SimAccessConnector for MockSimAccess {
    fn open(&self, _path: &Path) -> io::Result<Box<dyn SimAccessLink>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSimLink {
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct MockSimLink {
    closes: Arc<AtomicUsize>,
}

impl SimAccessLink for MockSimLink {
    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// FBTS ingest
// ============================================================================

#[derive(Default)]
struct MockThread {
    stop: AtomicBool,
    joined: AtomicBool,
}

/// Ingest launcher that starts no threads.
///
/// A launched "thread" finishes as soon as it is asked to stop, unless
/// [`MockIngestLauncher::hold_threads`] keeps it alive.
#[derive(Default)]
pub struct MockIngestLauncher {
    launches: Mutex<Vec<(IngestRequest, Arc<MockThread>)>>,
    fail_next: AtomicBool,
    hold: Arc<AtomicBool>,
}

impl MockIngestLauncher {
    /// Make the next launch fail with `AddrInUse`.
    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Keep stopped threads reporting as running.
    pub fn hold_threads(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    /// Request of the most recent launch.
    pub fn last_request(&self) -> Option<IngestRequest> {
        self.launches.lock().last().map(|(r, _)| r.clone())
    }

    /// Whether launch `index` was asked to stop.
    pub fn stop_requested(&self, index: usize) -> bool {
        self.launches
            .lock()
            .get(index)
            .is_some_and(|(_, t)| t.stop.load(Ordering::SeqCst))
    }

    /// Whether launch `index` was joined.
    pub fn joined(&self, index: usize) -> bool {
        self.launches
            .lock()
            .get(index)
            .is_some_and(|(_, t)| t.joined.load(Ordering::SeqCst))
    }
}

impl IngestLauncher for MockIngestLauncher {
    fn launch(&self, request: IngestRequest) -> io::Result<Box<dyn IngestHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken"));
        }
        let thread = Arc::new(MockThread::default());
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, request.port));
        self.launches.lock().push((request, Arc::clone(&thread)));
        Ok(Box::new(MockIngestHandle {
            thread,
            hold: Arc::clone(&self.hold),
            addr,
        }))
    }
}

struct MockIngestHandle {
    thread: Arc<MockThread>,
    hold: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl IngestHandle for MockIngestHandle {
    fn request_stop(&self) {
        self.thread.stop.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.thread.stop.load(Ordering::SeqCst) && !self.hold.load(Ordering::SeqCst)
    }

    fn join(self: Box<Self>) {
        self.thread.joined.store(true, Ordering::SeqCst);
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

// ============================================================================
// Call control
// ============================================================================

/// External call-control handler recording attach/detach.
#[derive(Default)]
pub struct MockCallControl {
    attached: Mutex<Vec<PathBuf>>,
    detached: Mutex<Vec<PathBuf>>,
}

impl MockCallControl {
    pub fn attached(&self) -> Vec<PathBuf> {
        self.attached.lock().clone()
    }

    pub fn detached(&self) -> Vec<PathBuf> {
        self.detached.lock().clone()
    }
}

impl CallControlHandler for MockCallControl {
    fn attach(&self, _name: &str, rendezvous: &Path) -> io::Result<()> {
        self.attached.lock().push(rendezvous.to_path_buf());
        Ok(())
    }

    fn detach(&self, _name: &str, rendezvous: &Path) {
        self.detached.lock().push(rendezvous.to_path_buf());
    }
}

// ============================================================================
// Observer
// ============================================================================

/// A notification seen by [`RecordingObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedEvent {
    Started {
        ms: MsId,
        started: bool,
    },
    Shutdown {
        ms: MsId,
        old: ShutdownState,
        new: ShutdownState,
    },
}

/// Observer that keeps every notification.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// `(old, new)` shutdown transitions of one station.
    pub fn shutdown_transitions(&self, id: MsId) -> Vec<(ShutdownState, ShutdownState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                ObservedEvent::Shutdown { ms, old, new } if ms == id => Some((old, new)),
                _ => None,
            })
            .collect()
    }

    /// Started-flag changes of one station.
    pub fn started_flags(&self, id: MsId) -> Vec<bool> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                ObservedEvent::Started { ms, started } if ms == id => Some(started),
                _ => None,
            })
            .collect()
    }
}

impl StationObserver for RecordingObserver {
    fn notify_started(&self, ms: MsId, _name: &str, started: bool) {
        self.events
            .lock()
            .push(ObservedEvent::Started { ms, started });
    }

    fn notify_shutdown(&self, ms: MsId, _name: &str, old: ShutdownState, new: ShutdownState) {
        self.events
            .lock()
            .push(ObservedEvent::Shutdown { ms, old, new });
    }
}

// ============================================================================
// Harness
// ============================================================================

/// All mocks wired together.
#[derive(Clone, Default)]
pub struct MockHarness {
    pub stacks: Arc<MockStackFactory>,
    pub radio: Arc<MockRadioConnector>,
    pub sim_access: Arc<MockSimAccess>,
    pub ingest: Arc<MockIngestLauncher>,
    pub observer: Arc<RecordingObserver>,
    pub call_control: Option<Arc<MockCallControl>>,
}

impl MockHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same mocks plus an external call-control handler.
    pub fn with_call_control() -> Self {
        Self {
            call_control: Some(Arc::new(MockCallControl::default())),
            ..Self::default()
        }
    }

    /// Services backed by these mocks.
    pub fn services(&self) -> StationServices {
        StationServices {
            stacks: self.stacks.clone(),
            radio: self.radio.clone(),
            sim_access: self.sim_access.clone(),
            ingest: self.ingest.clone(),
            observer: self.observer.clone(),
            call_control: self
                .call_control
                .clone()
                .map(|c| c as Arc<dyn CallControlHandler>),
        }
    }
}
