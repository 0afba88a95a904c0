//! Presence classification: is an observed device new, seen again, or still around?
//!
//! For every observation the engine looks the address up in the
//! [`RecordStore`]:
//!
//! - unknown address: a new record is stored with `seen_count = 0` ([`Classification::New`])
//! - known, but accepted less than the cooldown ago: nothing changes ([`Classification::Ignored`])
//! - known and the cooldown has passed: count, label and time are updated
//!   ([`Classification::ReSeen`]); a label differing from the stored one is
//!   additionally recorded as a name clash
//!
//! The cooldown gates every mutation, clash bookkeeping included.

use crate::cooldown::Cooldown;
use crate::observation::Observation;
use crate::record::{ClashRecord, DeviceRecord};
use crate::store::{RecordStore, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of folding one observation into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// First sighting; carries the stored record
    New(DeviceRecord),
    /// Accepted sighting of a known device; carries the updated record
    ReSeen(DeviceRecord),
    /// Known device still inside its cooldown
    Ignored,
}

impl Classification {
    /// The stored record, unless the observation was ignored.
    pub fn record(&self) -> Option<&DeviceRecord> {
        match self {
            Classification::New(record) | Classification::ReSeen(record) => Some(record),
            Classification::Ignored => None,
        }
    }
}

/// Tally of one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub new: usize,
    pub reseen: usize,
    pub ignored: usize,
    /// Observations whose record could not be written
    pub failed: usize,
}

impl CycleReport {
    pub fn add(&mut self, classification: &Classification) {
        match classification {
            Classification::New(_) => self.new += 1,
            Classification::ReSeen(_) => self.reseen += 1,
            Classification::Ignored => self.ignored += 1,
        }
    }

    /// Whether anything worth showing happened during the cycle.
    pub fn changed(&self) -> bool {
        self.new + self.reseen > 0
    }
}

/// Applies observations to the record store.
#[derive(Debug, Clone)]
pub struct PresenceEngine {
    store: Arc<RecordStore>,
    cooldown: Cooldown,
}

impl PresenceEngine {
    pub fn new(store: Arc<RecordStore>, cooldown: Cooldown) -> Self {
        Self { store, cooldown }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Classify `observation` and persist the result.
    ///
    /// # Errors
    /// Returns the store error when the device record cannot be written; the
    /// transition for this device is then abandoned. Failing to write a clash
    /// record is only logged.
    pub fn observe(&self, observation: &Observation) -> Result<Classification, StoreError> {
        let mac = observation.mac;

        let Some(known) = self.store.device(&mac) else {
            let record = DeviceRecord::first_sighting(
                mac,
                observation.label.clone(),
                observation.observed_at,
            );
            self.store.put_device(&record)?;
            info!(%mac, label = %record.label, "new device");
            return Ok(Classification::New(record));
        };

        if self
            .cooldown
            .is_active(known.last_seen_at, observation.observed_at)
        {
            debug!(%mac, last_seen_at = %known.last_seen_at, "device still in cooldown");
            return Ok(Classification::Ignored);
        }

        if observation.label != known.label {
            self.record_clash(&known, &observation.label);
        }

        let updated = known.seen_again(observation.label.clone(), observation.observed_at);
        self.store.put_device(&updated)?;
        info!(%mac, label = %updated.label, seen_count = updated.seen_count, "known device");
        Ok(Classification::ReSeen(updated))
    }

    fn record_clash(&self, known: &DeviceRecord, label: &str) {
        let mac = known.identifier;
        info!(%mac, new = label, known = %known.label, "same address, different name");

        let mut clash = self
            .store
            .clash(&mac)
            .unwrap_or_else(|| ClashRecord::starting_from(&known.label));
        clash.record_mismatch(label);

        if let Err(error) = self.store.put_clash(&mac, &clash) {
            warn!(%mac, %error, "failed to record name clash");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::DEFAULT_COOLDOWN;
    use crate::store::{CLASH_PREFIX, DEVICE_PREFIX};
    use crate::test_utils::{FailingBackend, TEST_MAC, at};
    use chrono::TimeDelta;
    use std::collections::BTreeSet;

    const NOW: i64 = 1_700_000_000;

    fn engine() -> PresenceEngine {
        PresenceEngine::new(Arc::new(RecordStore::in_memory()), Cooldown::default())
    }

    fn seed(engine: &PresenceEngine, label: &str, seen_count: u32, ago: TimeDelta) {
        let record = DeviceRecord {
            identifier: TEST_MAC,
            label: label.to_string(),
            seen_count,
            last_seen_at: at(NOW) - ago,
        };
        engine.store().put_device(&record).unwrap();
    }

    fn observe(engine: &PresenceEngine, label: &str) -> Classification {
        engine
            .observe(&Observation::new(TEST_MAC, label, at(NOW)))
            .unwrap()
    }

    #[test]
    fn test_new_device_is_stored_with_zero_count() {
        let engine = engine();
        let classification = observe(&engine, "Device 1");

        let stored = engine.store().device(&TEST_MAC).unwrap();
        assert_eq!(classification, Classification::New(stored.clone()));
        assert_eq!(stored.seen_count, 0);
        assert_eq!(stored.last_seen_at, at(NOW));
        assert_eq!(stored.label, "Device 1");
    }

    #[test]
    fn test_subsecond_observation_matches_stored_record() {
        let engine = engine();
        let observed_at = at(NOW) + TimeDelta::milliseconds(500);
        let observation = Observation::new(TEST_MAC, "Device 1", observed_at);

        let classification = engine.observe(&observation).unwrap();
        let stored = engine.store().device(&TEST_MAC).unwrap();
        assert_eq!(stored.last_seen_at, observation.observed_at);
        assert_eq!(classification.record(), Some(&stored));
    }

    #[test]
    fn test_within_cooldown_is_ignored_and_unchanged() {
        let engine = engine();
        seed(&engine, "Device 1", 2, TimeDelta::minutes(4 * 60 + 59));
        let before = engine.store().device(&TEST_MAC);

        assert_eq!(observe(&engine, "Device 1"), Classification::Ignored);
        assert_eq!(engine.store().device(&TEST_MAC), before);
    }

    #[test]
    fn test_repeated_sightings_are_idempotent_under_cooldown() {
        let engine = engine();
        assert!(matches!(observe(&engine, "Device 1"), Classification::New(_)));
        let first = engine.store().device(&TEST_MAC);

        for _ in 0..5 {
            assert_eq!(observe(&engine, "Device 1"), Classification::Ignored);
        }
        assert_eq!(engine.store().device(&TEST_MAC), first);
    }

    #[test]
    fn test_after_cooldown_count_increments() {
        let engine = engine();
        seed(&engine, "Device 1", 5, TimeDelta::minutes(5 * 60 + 1));

        let classification = observe(&engine, "Device 1");
        let stored = engine.store().device(&TEST_MAC).unwrap();
        assert_eq!(classification, Classification::ReSeen(stored.clone()));
        assert_eq!(stored.seen_count, 6);
        assert_eq!(stored.last_seen_at, at(NOW));
        assert!(engine.store().clash(&TEST_MAC).is_none());
    }

    #[test]
    fn test_exactly_at_cooldown_is_reseen() {
        let engine = engine();
        let cooldown = TimeDelta::from_std(DEFAULT_COOLDOWN).unwrap();
        seed(&engine, "Device 1", 0, cooldown);
        assert!(matches!(
            observe(&engine, "Device 1"),
            Classification::ReSeen(_)
        ));
    }

    #[test]
    fn test_label_change_records_clash() {
        let engine = engine();
        seed(&engine, "Phone", 1, TimeDelta::hours(6));

        observe(&engine, "Laptop");

        let stored = engine.store().device(&TEST_MAC).unwrap();
        assert_eq!(stored.label, "Laptop");
        assert_eq!(stored.seen_count, 2);

        let clash = engine.store().clash(&TEST_MAC).unwrap();
        assert_eq!(clash.occurrence_count, 1);
        assert_eq!(
            clash.distinct_labels,
            BTreeSet::from(["Laptop".to_string(), "Phone".to_string()])
        );
    }

    #[test]
    fn test_clash_accumulates_per_mismatch() {
        let engine = engine();
        seed(&engine, "A", 0, TimeDelta::hours(6));
        observe(&engine, "B");

        // Flip back to A after another cooldown
        seed(&engine, "B", 1, TimeDelta::hours(6));
        observe(&engine, "A");

        seed(&engine, "A", 2, TimeDelta::hours(6));
        observe(&engine, "C");

        let clash = engine.store().clash(&TEST_MAC).unwrap();
        assert_eq!(clash.occurrence_count, 3);
        assert_eq!(
            clash.distinct_labels,
            BTreeSet::from(["A".to_string(), "B".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_label_change_inside_cooldown_records_nothing() {
        let engine = engine();
        seed(&engine, "Phone", 1, TimeDelta::hours(1));

        assert_eq!(observe(&engine, "Laptop"), Classification::Ignored);
        assert!(engine.store().clash(&TEST_MAC).is_none());
        assert_eq!(engine.store().device(&TEST_MAC).unwrap().label, "Phone");
    }

    #[test]
    fn test_corrupt_record_is_treated_as_new() {
        let backend = crate::store::MemoryBackend::default();
        crate::store::StorageBackend::write(&backend, "device-AA:BB:CC:DD:EE:FF", b"garbage")
            .unwrap();
        let engine = PresenceEngine::new(
            Arc::new(RecordStore::new(backend)),
            Cooldown::default(),
        );
        assert!(matches!(observe(&engine, "Device 1"), Classification::New(_)));
    }

    #[test]
    fn test_device_write_failure_is_returned() {
        let engine = PresenceEngine::new(
            Arc::new(RecordStore::new(FailingBackend::failing_prefix(
                DEVICE_PREFIX,
            ))),
            Cooldown::default(),
        );
        let result = engine.observe(&Observation::new(TEST_MAC, "x", at(NOW)));
        assert!(matches!(result, Err(StoreError::Write { .. })));
    }

    #[test]
    fn test_clash_write_failure_does_not_block_update() {
        let engine = PresenceEngine::new(
            Arc::new(RecordStore::new(FailingBackend::failing_prefix(
                CLASH_PREFIX,
            ))),
            Cooldown::default(),
        );
        seed(&engine, "Phone", 3, TimeDelta::hours(6));

        assert!(matches!(observe(&engine, "Laptop"), Classification::ReSeen(_)));
        let stored = engine.store().device(&TEST_MAC).unwrap();
        assert_eq!(stored.label, "Laptop");
        assert_eq!(stored.seen_count, 4);
        assert!(engine.store().clash(&TEST_MAC).is_none());
    }

    #[test]
    fn test_cycle_report_tally() {
        let mut report = CycleReport::default();
        assert!(!report.changed());
        report.add(&Classification::Ignored);
        assert!(!report.changed());
        report.add(&Classification::New(DeviceRecord::first_sighting(
            TEST_MAC,
            "x".into(),
            at(0),
        )));
        assert!(report.changed());
        assert_eq!(report.new, 1);
        assert_eq!(report.ignored, 1);
    }
}
