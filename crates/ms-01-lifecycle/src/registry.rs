//! # MS Registry
//!
//! Owns every [`MobileStation`] and funnels all lifecycle operations.
//!
//! Deletion is two-phase: [`MsRegistry::delete`] marks a station and starts
//! its power-off, [`MsRegistry::reclaim`] closes its links and removes it once
//! the station is `Complete` and its ingest thread has been joined.

use std::collections::BTreeMap;

use shared_types::{MsId, ShutdownState};
use tracing::{debug, info};

use crate::domain::{CallControlSink, MobileStation, MsSettings, StopOutcome};
use crate::error::{StartError, StopError};
use crate::ports::L1Indication;
use crate::services::StationServices;

/// Result of [`MsRegistry::reclaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaim {
    /// The station is not `Complete` yet.
    NotTerminal,
    /// Links are closed; the station stays registered.
    Released,
    /// Marked for deletion, but its ingest thread has not exited yet.
    Waiting,
    /// The station was removed from the registry.
    Removed,
}

/// Ordered collection of live stations.
#[derive(Debug)]
pub struct MsRegistry {
    stations: BTreeMap<MsId, MobileStation>,
    next_id: u32,
    services: StationServices,
}

impl MsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(services: StationServices) -> Self {
        Self {
            stations: BTreeMap::new(),
            next_id: 1,
            services,
        }
    }

    /// Create a powered-off station and pick its call-control sink.
    pub fn create(&mut self, name: impl Into<String>, settings: MsSettings) -> MsId {
        let name = name.into();
        let id = MsId(self.next_id);
        self.next_id += 1;

        let call_control =
            CallControlSink::select(&name, &settings, self.services.call_control.as_ref());
        call_control.attach(&name);
        let stack = self.services.stacks.create(&name, &settings, &call_control);

        info!(%id, ms = %name, call_control = call_control.kind(), "Mobile station created");
        let station = MobileStation::new(
            id,
            name,
            settings,
            stack,
            call_control,
            self.services.observer.clone(),
        );
        self.stations.insert(id, station);
        id
    }

    /// Power a `Complete` station on.
    ///
    /// # Errors
    ///
    /// - [`StartError::NotStopped`] unless the station is `Complete`
    /// - [`StartError::IngestRunning`] while the previous ingest thread is
    ///   still exiting; nothing is changed
    /// - [`StartError::DuplicateRadioLink`] / [`StartError::DuplicateSimAccess`]
    ///   if a live station uses the same socket path; nothing is changed
    /// - [`StartError::Ingest`] if the FBTS socket cannot be bound
    /// - [`StartError::RadioLinkOpen`] if layer 2 is unreachable; the
    ///   partially started station is torn down again
    pub fn power_on(&mut self, id: MsId) -> Result<(), StartError> {
        let station = self.stations.get(&id).ok_or(StartError::UnknownStation(id))?;
        if station.shutdown_state() != ShutdownState::Complete {
            return Err(StartError::NotStopped {
                state: station.shutdown_state(),
            });
        }
        self.check_conflicts(station)?;

        let services = &self.services;
        let station = self
            .stations
            .get_mut(&id)
            .ok_or(StartError::UnknownStation(id))?;
        station.power_on(services)
    }

    fn check_conflicts(&self, station: &MobileStation) -> Result<(), StartError> {
        let mine = station.settings();
        for other in self.stations.values() {
            if other.id() == station.id() || other.shutdown_state() == ShutdownState::Complete {
                continue;
            }
            if other.settings().layer2_socket_path == mine.layer2_socket_path {
                return Err(StartError::DuplicateRadioLink {
                    other: other.name().to_string(),
                });
            }
            if other.settings().sap_socket_path == mine.sap_socket_path {
                return Err(StartError::DuplicateSimAccess {
                    other: other.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Power a station off, gracefully or forced.
    ///
    /// # Errors
    ///
    /// [`StopError::EventAllocation`] if the detach event cannot be allocated;
    /// the state is left unchanged.
    pub fn power_off(&mut self, id: MsId, force: bool) -> Result<StopOutcome, StopError> {
        self.stations
            .get_mut(&id)
            .ok_or(StopError::UnknownStation(id))?
            .power_off(force)
    }

    /// Mark a station for removal and start its power-off.
    ///
    /// The station stays registered until [`Self::reclaim`] removes it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::power_off`].
    pub fn delete(&mut self, id: MsId, force: bool) -> Result<StopOutcome, StopError> {
        let station = self
            .stations
            .get_mut(&id)
            .ok_or(StopError::UnknownStation(id))?;
        if !station.is_deleting() {
            station.mark_deleting();
            station.release_call_control();
            debug!(ms = %station.name(), force, "Mobile station marked for deletion");
        }
        station.power_off(force)
    }

    /// Apply a layer-1 reset to a station.
    ///
    /// Returns `true` if the reset changed the station.
    pub fn handle_reset(&mut self, id: MsId) -> bool {
        let sim_access = self.services.sim_access.as_ref();
        self.stations
            .get_mut(&id)
            .is_some_and(|station| station.handle_reset(sim_access))
    }

    /// Tell a station's cell selection that layer 1 was reset.
    pub fn forward_radio_reset(&mut self, id: MsId) {
        if let Some(station) = self.stations.get_mut(&id) {
            station.forward_radio_reset();
        }
    }

    /// Collect pending indications from every open radio link.
    pub fn poll_radio(&mut self) -> Vec<(MsId, L1Indication)> {
        let mut out = Vec::new();
        for (id, station) in &mut self.stations {
            while let Some(indication) = station.poll_radio() {
                out.push((*id, indication));
            }
        }
        out
    }

    /// Release a `Complete` station's resources, removing it if marked.
    ///
    /// Never calls layer exit hooks; those ran at teardown. Returns `None`
    /// for an unknown id.
    pub fn reclaim(&mut self, id: MsId) -> Option<Reclaim> {
        let station = self.stations.get_mut(&id)?;
        if station.shutdown_state() != ShutdownState::Complete {
            return Some(Reclaim::NotTerminal);
        }

        if station.release_links() {
            debug!(ms = %station.name(), "Radio and SIM links closed");
        }
        let joined = station.reap_ingest();

        if !station.is_deleting() {
            return Some(Reclaim::Released);
        }
        if !joined {
            return Some(Reclaim::Waiting);
        }

        if let Some(station) = self.stations.remove(&id) {
            info!(%id, ms = %station.name(), "Mobile station removed");
        }
        Some(Reclaim::Removed)
    }

    /// Stop and join every ingest thread. Used at process exit.
    pub fn join_all(&mut self) {
        for station in self.stations.values_mut() {
            station.join_ingest();
            station.release_links();
        }
    }

    /// Ids in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<MsId> {
        self.stations.keys().copied().collect()
    }

    /// Find a station by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<MsId> {
        self.stations
            .values()
            .find(|s| s.name() == name)
            .map(MobileStation::id)
    }

    #[must_use]
    pub fn get(&self, id: MsId) -> Option<&MobileStation> {
        self.stations.get(&id)
    }

    pub fn get_mut(&mut self, id: MsId) -> Option<&mut MobileStation> {
        self.stations.get_mut(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    #[must_use]
    pub fn services(&self) -> &StationServices {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockHarness, StackCall};
    use crate::SimType;
    use shared_bus::ResetKind;
    use shared_types::{Layer, MmEventKind, StationInbound};
    use shared_types::ShutdownState::{AwaitingReset, Complete, ImsiDetach, None as Running};
    use std::path::PathBuf;

    fn registry() -> (MockHarness, MsRegistry) {
        let harness = MockHarness::new();
        let registry = MsRegistry::new(harness.services());
        (harness, registry)
    }

    fn started(harness: &MockHarness, registry: &mut MsRegistry, name: &str) -> MsId {
        let id = registry.create(name, MsSettings {
            layer2_socket_path: PathBuf::from(format!("/tmp/l2_{name}")),
            sap_socket_path: PathBuf::from(format!("/tmp/sap_{name}")),
            ..MsSettings::default()
        });
        registry.power_on(id).unwrap();
        assert!(registry.handle_reset(id));
        assert!(registry.get(id).unwrap().is_started());
        harness.observer.clear();
        id
    }

    #[test]
    fn test_create_is_powered_off() {
        let (_h, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        let ms = registry.get(id).unwrap();
        assert_eq!(ms.shutdown_state(), Complete);
        assert!(!ms.is_started());
        assert_eq!(ms.call_control().kind(), "internal");
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let (_h, mut registry) = registry();
        let a = registry.create("a", MsSettings::default());
        let b = registry.create("b", MsSettings::default());
        assert_eq!(registry.ids(), vec![a, b]);
        assert_eq!(registry.find("b"), Some(b));
    }

    #[test]
    fn test_power_on_initializes_and_requests_reset() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        registry.power_on(id).unwrap();

        let ms = registry.get(id).unwrap();
        assert_eq!(ms.shutdown_state(), Running);
        assert!(!ms.is_started());
        assert!(ms.has_radio_link());
        assert!(ms.has_ingest());

        let inits = harness.stacks.state("1").lock().inits();
        assert_eq!(inits, Layer::INIT_ORDER.to_vec());
        assert_eq!(harness.radio.resets(), vec![ResetKind::Full]);
        assert_eq!(harness.ingest.launch_count(), 1);
    }

    #[test]
    fn test_power_on_requires_complete() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        assert!(matches!(
            registry.power_on(id),
            Err(StartError::NotStopped { state: Running })
        ));
    }

    #[test]
    fn test_duplicate_radio_link_rejected() {
        let (harness, mut registry) = registry();
        let first = registry.create("first", MsSettings::default());
        let second = registry.create("second", MsSettings {
            sap_socket_path: PathBuf::from("/tmp/other_sap"),
            ..MsSettings::default()
        });
        registry.power_on(first).unwrap();
        harness.observer.clear();

        let err = registry.power_on(second).unwrap_err();
        assert!(matches!(err, StartError::DuplicateRadioLink { ref other } if other == "first"));

        assert_eq!(registry.get(second).unwrap().shutdown_state(), Complete);
        assert_eq!(registry.get(first).unwrap().shutdown_state(), Running);
        assert!(harness.observer.events().is_empty());
        assert_eq!(harness.ingest.launch_count(), 1);
    }

    #[test]
    fn test_duplicate_sim_access_rejected() {
        let (_h, mut registry) = registry();
        let first = registry.create("first", MsSettings::default());
        let second = registry.create("second", MsSettings {
            layer2_socket_path: PathBuf::from("/tmp/other_l2"),
            ..MsSettings::default()
        });
        registry.power_on(first).unwrap();
        assert!(matches!(
            registry.power_on(second),
            Err(StartError::DuplicateSimAccess { .. })
        ));
    }

    #[test]
    fn test_powered_off_station_does_not_conflict() {
        let (_h, mut registry) = registry();
        let first = registry.create("first", MsSettings::default());
        let second = registry.create("second", MsSettings::default());
        registry.power_on(second).unwrap();
        assert_eq!(registry.get(first).unwrap().shutdown_state(), Complete);
    }

    #[test]
    fn test_ingest_bind_failure_leaves_station_untouched() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        harness.ingest.fail_next_launch();

        assert!(matches!(registry.power_on(id), Err(StartError::Ingest(_))));
        let ms = registry.get(id).unwrap();
        assert_eq!(ms.shutdown_state(), Complete);
        assert!(harness.stacks.state("1").lock().inits().is_empty());
    }

    #[test]
    fn test_radio_open_failure_tears_down() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        harness.radio.fail_open(true);

        let err = registry.power_on(id).unwrap_err();
        assert!(matches!(err, StartError::RadioLinkOpen { .. }));

        let ms = registry.get(id).unwrap();
        assert_eq!(ms.shutdown_state(), Complete);
        assert!(!ms.has_radio_link());
        assert_eq!(
            harness.stacks.state("1").lock().exits(),
            Layer::EXIT_ORDER.to_vec()
        );
        assert!(harness.ingest.stop_requested(0));
    }

    #[test]
    fn test_graceful_power_off_walks_every_state() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");

        assert_eq!(registry.power_off(id, false).unwrap(), StopOutcome::Pending);
        assert_eq!(registry.get(id).unwrap().shutdown_state(), ImsiDetach);
        let detach_sent = harness
            .stacks
            .state("1")
            .lock()
            .calls
            .iter()
            .any(|c| matches!(c, StackCall::MmEvent(ev) if ev.kind == MmEventKind::ImsiDetach));
        assert!(detach_sent);

        // Detach done.
        assert_eq!(registry.power_off(id, true).unwrap(), StopOutcome::Stopped);
        assert_eq!(registry.get(id).unwrap().shutdown_state(), AwaitingReset);

        assert!(registry.handle_reset(id));
        assert_eq!(registry.get(id).unwrap().shutdown_state(), Complete);

        assert_eq!(
            harness.observer.shutdown_transitions(id),
            vec![
                (Running, ImsiDetach),
                (ImsiDetach, AwaitingReset),
                (AwaitingReset, Complete),
            ]
        );
    }

    #[test]
    fn test_forced_power_off_skips_detach() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");

        assert_eq!(registry.power_off(id, true).unwrap(), StopOutcome::Stopped);
        let ms = registry.get(id).unwrap();
        assert_eq!(ms.shutdown_state(), AwaitingReset);
        assert!(!ms.is_started());
        assert_eq!(
            harness.observer.shutdown_transitions(id),
            vec![(Running, AwaitingReset)]
        );
        // Reset requested at power-on and again at teardown.
        assert_eq!(harness.radio.resets(), vec![ResetKind::Full, ResetKind::Full]);
    }

    #[test]
    fn test_never_started_goes_straight_to_complete() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        registry.power_on(id).unwrap();
        harness.observer.clear();

        assert_eq!(registry.power_off(id, false).unwrap(), StopOutcome::Stopped);
        assert_eq!(registry.get(id).unwrap().shutdown_state(), Complete);
        assert_eq!(
            harness.observer.shutdown_transitions(id),
            vec![(Running, Complete)]
        );
    }

    #[test]
    fn test_power_off_noops() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        registry.power_off(id, false).unwrap();

        // Graceful again while detaching.
        assert_eq!(registry.power_off(id, false).unwrap(), StopOutcome::Unchanged);

        registry.power_off(id, true).unwrap();
        // Forced while awaiting reset.
        assert_eq!(registry.power_off(id, true).unwrap(), StopOutcome::Unchanged);
        assert_eq!(registry.get(id).unwrap().shutdown_state(), AwaitingReset);
    }

    #[test]
    fn test_detach_alloc_failure_keeps_state() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        harness.stacks.state("1").lock().alloc_fails = true;

        assert!(matches!(
            registry.power_off(id, false),
            Err(StopError::EventAllocation { kind: MmEventKind::ImsiDetach })
        ));
        assert_eq!(registry.get(id).unwrap().shutdown_state(), Running);
    }

    #[test]
    fn test_first_reset_bootstraps_sim() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings {
            sim: SimType::Test,
            ..MsSettings::default()
        });
        registry.power_on(id).unwrap();
        assert!(registry.handle_reset(id));

        let calls = harness.stacks.state("1").lock().calls.clone();
        assert!(calls
            .iter()
            .any(|c| matches!(c, StackCall::InsertSim(crate::ports::SimCard::Test(_)))));
        assert_eq!(
            harness.observer.started_flags(id),
            vec![true]
        );

        // A second reset does nothing.
        assert!(!registry.handle_reset(id));
    }

    #[test]
    fn test_no_sim_switches_on() {
        let (harness, mut registry) = registry();
        started(&harness, &mut registry, "1");
        let calls = harness.stacks.state("1").lock().calls.clone();
        assert!(calls.contains(&StackCall::SwitchOn));
    }

    #[test]
    fn test_sap_bootstrap_opens_sim_access() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings {
            sim: SimType::Sap,
            ..MsSettings::default()
        });
        registry.power_on(id).unwrap();
        registry.handle_reset(id);

        assert_eq!(harness.sim_access.open_count(), 1);
        registry.power_off(id, true).unwrap();
        registry.handle_reset(id);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Released));
        assert_eq!(harness.sim_access.close_count(), 1);
    }

    #[test]
    fn test_reset_on_powered_off_station_is_ignored() {
        let (_h, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        assert!(!registry.handle_reset(id));
        assert!(!registry.get(id).unwrap().is_started());
    }

    #[test]
    fn test_delete_running_station_is_two_phase() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");

        assert_eq!(registry.delete(id, true).unwrap(), StopOutcome::Stopped);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.reclaim(id), Some(Reclaim::NotTerminal));

        registry.handle_reset(id);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Removed));
        assert!(registry.is_empty());
        assert_eq!(harness.radio.close_count(), 1);
    }

    #[test]
    fn test_delete_complete_station_skips_exit_hooks() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        registry.power_off(id, true).unwrap();
        registry.handle_reset(id);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Released));

        let exits_before = harness.stacks.state("1").lock().exits().len();
        assert_eq!(registry.delete(id, false).unwrap(), StopOutcome::Unchanged);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Removed));
        assert_eq!(harness.stacks.state("1").lock().exits().len(), exits_before);
    }

    #[test]
    fn test_reclaim_waits_for_ingest_thread() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        harness.ingest.hold_threads(true);

        registry.delete(id, true).unwrap();
        registry.handle_reset(id);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Waiting));

        harness.ingest.hold_threads(false);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Removed));
    }

    #[test]
    fn test_ingest_failure_is_recorded() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        harness
            .ingest
            .last_request()
            .unwrap()
            .inbox
            .send(StationInbound::IngestFailed {
                reason: "recv failed".to_string(),
            })
            .unwrap();

        let ms = registry.get_mut(id).unwrap();
        crate::dispatch::drain(ms);
        assert_eq!(ms.take_failure().as_deref(), Some("recv failed"));
        assert!(ms.take_failure().is_none());
    }

    #[test]
    fn test_power_on_again_after_complete() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        registry.power_off(id, true).unwrap();
        registry.handle_reset(id);
        registry.reclaim(id);

        registry.power_on(id).unwrap();
        assert_eq!(registry.get(id).unwrap().shutdown_state(), Running);
        assert_eq!(harness.ingest.launch_count(), 2);
        assert_eq!(
            harness.observer.shutdown_transitions(id),
            vec![(Running, AwaitingReset), (AwaitingReset, Complete), (Complete, Running)]
        );
    }

    #[test]
    fn test_power_on_waits_for_previous_ingest_thread() {
        let (harness, mut registry) = registry();
        let id = started(&harness, &mut registry, "1");
        harness.ingest.hold_threads(true);
        registry.power_off(id, true).unwrap();
        registry.handle_reset(id);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Released));

        assert!(matches!(
            registry.power_on(id),
            Err(StartError::IngestRunning)
        ));
        assert_eq!(registry.get(id).unwrap().shutdown_state(), Complete);
        assert!(!harness.ingest.joined(0));
        assert_eq!(harness.ingest.launch_count(), 1);

        harness.ingest.hold_threads(false);
        registry.power_on(id).unwrap();
        assert!(harness.ingest.joined(0));
        assert_eq!(harness.ingest.launch_count(), 2);
    }

    #[test]
    fn test_random_imei_applied_at_power_on() {
        let (_h, mut registry) = registry();
        let id = registry.create("1", MsSettings {
            imei_random: true,
            ..MsSettings::default()
        });
        registry.power_on(id).unwrap();
        assert!(!registry.get(id).unwrap().settings().has_default_imei());
    }

    #[test]
    fn test_external_call_control_attach_and_detach() {
        let harness = MockHarness::with_call_control();
        let mut registry = MsRegistry::new(harness.services());
        let id = registry.create("7", MsSettings::default());
        let cc = harness.call_control.clone().unwrap();
        assert_eq!(cc.attached(), vec![PathBuf::from("/tmp/ms_mncc_7")]);

        registry.delete(id, true).unwrap();
        registry.delete(id, true).unwrap();
        assert_eq!(cc.detached(), vec![PathBuf::from("/tmp/ms_mncc_7")]);
        assert_eq!(registry.reclaim(id), Some(Reclaim::Removed));
    }

    #[test]
    fn test_poll_radio_collects_indications() {
        let (harness, mut registry) = registry();
        let id = registry.create("1", MsSettings::default());
        registry.power_on(id).unwrap();
        harness
            .radio
            .inject(L1Indication::Reset(ResetKind::Full));

        assert_eq!(
            registry.poll_radio(),
            vec![(id, L1Indication::Reset(ResetKind::Full))]
        );
        assert!(registry.poll_radio().is_empty());
    }
}
