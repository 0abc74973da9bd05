//! Persisted person-id → scheduled-occurrence map.
//!
//! The scheduling core owns this map exclusively; every write funnels
//! through these methods so the at-most-one-per-person invariant and the
//! fired latch hold no matter which path (timer, reconciliation tick,
//! confirm hint) triggers the mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use catchup_core::ScheduledOccurrence;

use crate::kv::KvStorage;

const SCHEDULE_KEY: &str = "scheduled_occurrences";

pub struct ScheduleStore {
    kv: Arc<dyn KvStorage>,
    entries: Mutex<HashMap<Uuid, ScheduledOccurrence>>,
}

impl ScheduleStore {
    /// Load the schedule map from the substrate. Corrupt payloads are logged
    /// and treated as an empty map — never fatal.
    pub fn open(kv: Arc<dyn KvStorage>) -> Self {
        let entries = match kv.get(SCHEDULE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<HashMap<Uuid, ScheduledOccurrence>>(&raw)
            {
                Ok(map) => map,
                Err(e) => {
                    warn!(key = SCHEDULE_KEY, error = %e, "Corrupt schedule state, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(key = SCHEDULE_KEY, error = %e, "Failed to read schedule state, starting empty");
                HashMap::new()
            }
        };
        Self {
            kv,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, person_id: Uuid) -> Option<ScheduledOccurrence> {
        self.entries.lock().unwrap().get(&person_id).cloned()
    }

    /// Insert or overwrite the occurrence for its person id. Overwriting is
    /// what keeps at most one occurrence per person.
    pub fn put(&self, occurrence: ScheduledOccurrence) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(occurrence.person_id, occurrence);
        self.persist(&entries)
    }

    pub fn remove(&self, person_id: Uuid) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(&person_id).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    pub fn all(&self) -> Vec<ScheduledOccurrence> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    /// Flip the fired latch for a person's current occurrence.
    ///
    /// Returns `true` only for the first caller; a second fire path racing
    /// on the same occurrence sees `false` and must skip dispatch. The
    /// latch only takes when the write lands: a failed persist rolls the
    /// flag back so the next pass can retry the fire.
    pub fn mark_fired(&self, person_id: Uuid) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if !matches!(entries.get(&person_id), Some(occ) if !occ.fired) {
            return Ok(false);
        }
        if let Some(occ) = entries.get_mut(&person_id) {
            occ.fired = true;
        }
        if let Err(e) = self.persist(&entries) {
            if let Some(occ) = entries.get_mut(&person_id) {
                occ.fired = false;
            }
            return Err(e);
        }
        Ok(true)
    }

    fn persist(&self, entries: &HashMap<Uuid, ScheduledOccurrence>) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.kv.set(SCHEDULE_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use catchup_core::{ContactMethod, Frequency};
    use chrono::Local;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Substrate whose next `set` fails, for persist-error paths.
    #[derive(Default)]
    struct FlakyKv {
        inner: MemoryKv,
        fail_next_set: AtomicBool,
    }

    impl FlakyKv {
        fn fail_next_set(&self) {
            self.fail_next_set.store(true, Ordering::SeqCst);
        }
    }

    impl KvStorage for FlakyKv {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_next_set.swap(false, Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    fn occurrence(person_id: Uuid, fire_at_ms: i64) -> ScheduledOccurrence {
        ScheduledOccurrence {
            person_id,
            person_name: "Alice".to_string(),
            method: ContactMethod::Call,
            frequency: Frequency::Weekly,
            fire_at_ms,
            timezone: Local::now().offset().to_string(),
            fired: false,
        }
    }

    #[test]
    fn test_put_overwrites_same_person() {
        let store = ScheduleStore::open(Arc::new(MemoryKv::new()));
        let id = Uuid::new_v4();

        store.put(occurrence(id, 1_000)).unwrap();
        store.put(occurrence(id, 2_000)).unwrap();

        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fire_at_ms, 2_000);
    }

    #[test]
    fn test_mark_fired_latches_once() {
        let store = ScheduleStore::open(Arc::new(MemoryKv::new()));
        let id = Uuid::new_v4();
        store.put(occurrence(id, 1_000)).unwrap();

        assert!(store.mark_fired(id).unwrap());
        assert!(!store.mark_fired(id).unwrap());
        assert!(!store.mark_fired(Uuid::new_v4()).unwrap());
        assert!(store.get(id).unwrap().fired);
    }

    #[test]
    fn test_mark_fired_rolls_back_on_persist_failure() {
        let kv = Arc::new(FlakyKv::default());
        let store = ScheduleStore::open(kv.clone());
        let id = Uuid::new_v4();
        store.put(occurrence(id, 1_000)).unwrap();

        kv.fail_next_set();
        assert!(store.mark_fired(id).is_err());
        // Latch untouched, so the retry takes it.
        assert!(!store.get(id).unwrap().fired);
        assert!(store.mark_fired(id).unwrap());
        assert!(store.get(id).unwrap().fired);
    }

    #[test]
    fn test_survives_reload() {
        let kv = Arc::new(MemoryKv::new());
        let id = Uuid::new_v4();
        {
            let store = ScheduleStore::open(kv.clone());
            store.put(occurrence(id, 5_000)).unwrap();
        }
        let store = ScheduleStore::open(kv);
        assert_eq!(store.get(id).unwrap().fire_at_ms, 5_000);
    }

    #[test]
    fn test_corrupt_payload_starts_empty() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(SCHEDULE_KEY, "not json {{{").unwrap();
        let store = ScheduleStore::open(kv);
        assert!(store.all().is_empty());
        // And the store keeps working after recovery.
        let id = Uuid::new_v4();
        store.put(occurrence(id, 1)).unwrap();
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let store = ScheduleStore::open(Arc::new(MemoryKv::new()));
        store.remove(Uuid::new_v4()).unwrap();
    }
}
