//! # Work Dispatcher
//!
//! Drains a station's protocol-layer queues to quiescence. One pass pumps
//! the FBTS inbox and then polls every queue in
//! [`WorkQueue::DISPATCH_ORDER`]; passes repeat until one does nothing.

use shared_types::WorkQueue;

use crate::domain::MobileStation;

/// Drain every queue of `ms` until a full pass reports no work.
///
/// Returns `true` if any pass did work.
pub fn drain(ms: &mut MobileStation) -> bool {
    let mut worked = false;
    while run_pass(ms) {
        worked = true;
    }
    worked
}

/// One pass over the inbox and every queue. Every hook runs even when an
/// earlier one already reported work.
fn run_pass(ms: &mut MobileStation) -> bool {
    let mut work = ms.pump_inbox();
    let stack = ms.stack_mut();
    for queue in WorkQueue::DISPATCH_ORDER {
        work |= stack.dequeue(queue);
    }
    work
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockHarness, StackCall};
    use crate::MsSettings;
    use shared_types::{MmEventKind, StationInbound};

    fn powered_on() -> (MockHarness, crate::MsRegistry, shared_types::MsId) {
        let harness = MockHarness::new();
        let mut registry = crate::MsRegistry::new(harness.services());
        let id = registry.create("1", MsSettings::default());
        registry.power_on(id).unwrap();
        (harness, registry, id)
    }

    #[test]
    fn test_idle_station_does_one_pass() {
        let (harness, mut registry, id) = powered_on();
        harness.stacks.state("1").lock().calls.clear();

        assert!(!drain(registry.get_mut(id).unwrap()));

        let dequeues = harness.stacks.state("1").lock().dequeues();
        assert_eq!(dequeues, WorkQueue::DISPATCH_ORDER.to_vec());
    }

    #[test]
    fn test_drains_to_quiescence() {
        let (harness, mut registry, id) = powered_on();
        {
            let state = harness.stacks.state("1");
            let mut state = state.lock();
            state.pending.insert(WorkQueue::RadioResource, 3);
            state.pending.insert(WorkQueue::CallControl, 1);
            state.calls.clear();
        }

        assert!(drain(registry.get_mut(id).unwrap()));

        let state = harness.stacks.state("1");
        let state = state.lock();
        assert!(state.pending.values().all(|&n| n == 0));
        // Three passes with work and one empty pass.
        assert_eq!(state.dequeues().len(), 4 * WorkQueue::DISPATCH_ORDER.len());
    }

    #[test]
    fn test_repeated_drain_after_quiescence() {
        let (_harness, mut registry, id) = powered_on();
        let ms = registry.get_mut(id).unwrap();
        drain(ms);
        assert!(!drain(ms));
        assert!(!drain(ms));
    }

    #[test]
    fn test_auth_response_reaches_mm_once() {
        let (harness, mut registry, id) = powered_on();
        let request = harness.ingest.last_request().unwrap();
        request
            .inbox
            .send(StationInbound::AuthResponse {
                session_id: 9,
                sres: [0xde, 0xad, 0xbe, 0xef],
            })
            .unwrap();

        assert!(drain(registry.get_mut(id).unwrap()));

        let state = harness.stacks.state("1");
        let submitted: Vec<_> = state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StackCall::MmEvent(ev) if ev.kind == MmEventKind::AuthResponse => Some(ev.sres),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, vec![[0xde, 0xad, 0xbe, 0xef]]);
    }

    #[test]
    fn test_auth_response_dropped_without_buffer() {
        let (harness, mut registry, id) = powered_on();
        harness.stacks.state("1").lock().alloc_fails = true;
        harness
            .ingest
            .last_request()
            .unwrap()
            .inbox
            .send(StationInbound::AuthResponse {
                session_id: 1,
                sres: [1, 2, 3, 4],
            })
            .unwrap();

        drain(registry.get_mut(id).unwrap());

        let state = harness.stacks.state("1");
        assert!(!state
            .lock()
            .calls
            .iter()
            .any(|c| matches!(c, StackCall::MmEvent(_))));
    }

    #[test]
    fn test_ss_request_forwarded() {
        let (harness, mut registry, id) = powered_on();
        harness
            .ingest
            .last_request()
            .unwrap()
            .inbox
            .send(StationInbound::SsRequest {
                ussd: "*101#".to_string(),
                flags: 0,
            })
            .unwrap();

        drain(registry.get_mut(id).unwrap());

        let state = harness.stacks.state("1");
        assert!(state
            .lock()
            .calls
            .contains(&StackCall::SsRequest("*101#".to_string(), 0)));
    }
}
