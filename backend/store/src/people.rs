//! Persisted person list, one key holding a serialized `Vec<Person>`.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use catchup_core::{CatchUpError, Person};

use crate::kv::KvStorage;

const PEOPLE_KEY: &str = "catch_up_people";

pub struct PersonStore {
    kv: Arc<dyn KvStorage>,
    people: Mutex<Vec<Person>>,
}

impl PersonStore {
    /// Load the person list. Corrupt payloads are logged and treated as an
    /// empty list — never fatal.
    pub fn open(kv: Arc<dyn KvStorage>) -> Self {
        let people = match kv.get(PEOPLE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Person>>(&raw) {
                Ok(list) => list,
                Err(e) => {
                    warn!(key = PEOPLE_KEY, error = %e, "Corrupt person list, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = PEOPLE_KEY, error = %e, "Failed to read person list, starting empty");
                Vec::new()
            }
        };
        Self {
            kv,
            people: Mutex::new(people),
        }
    }

    pub fn all(&self) -> Vec<Person> {
        self.people.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Person> {
        self.people.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }

    /// Insert or replace a person, validating cross-field consistency at
    /// this boundary.
    pub fn upsert(&self, person: Person) -> Result<(), CatchUpError> {
        person.validate()?;
        let mut people = self.people.lock().unwrap();
        match people.iter_mut().find(|p| p.id == person.id) {
            Some(slot) => *slot = person,
            None => people.push(person),
        }
        self.persist(&people)
            .map_err(|e| CatchUpError::Storage(e.to_string()))
    }

    /// Remove a person. Returns `true` if someone was removed.
    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let mut people = self.people.lock().unwrap();
        let before = people.len();
        people.retain(|p| p.id != id);
        if people.len() != before {
            self.persist(&people)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn persist(&self, people: &[Person]) -> Result<()> {
        let raw = serde_json::to_string(people)?;
        self.kv.set(PEOPLE_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use catchup_core::{ContactMethod, Frequency, TimeSelection, TimeWindow};

    fn person(name: &str) -> Person {
        Person {
            id: Uuid::new_v4(),
            name: name.to_string(),
            frequency: Frequency::Random,
            time: TimeSelection::RandomWindow {
                window: TimeWindow::Morning,
            },
            method: ContactMethod::Text,
        }
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let store = PersonStore::open(Arc::new(MemoryKv::new()));
        let mut p = person("Alice");
        store.upsert(p.clone()).unwrap();
        p.name = "Alice B".to_string();
        store.upsert(p.clone()).unwrap();

        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Alice B");
    }

    #[test]
    fn test_upsert_rejects_invalid() {
        let store = PersonStore::open(Arc::new(MemoryKv::new()));
        let mut p = person("");
        p.name = "  ".to_string();
        assert!(store.upsert(p).is_err());
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_remove() {
        let store = PersonStore::open(Arc::new(MemoryKv::new()));
        let p = person("Bob");
        store.upsert(p.clone()).unwrap();
        assert!(store.remove(p.id).unwrap());
        assert!(!store.remove(p.id).unwrap());
        assert!(store.get(p.id).is_none());
    }

    #[test]
    fn test_corrupt_payload_starts_empty() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(PEOPLE_KEY, "[{\"broken\"").unwrap();
        let store = PersonStore::open(kv);
        assert!(store.all().is_empty());
    }
}
