//! Key-value text substrate backing the persisted collections.
//!
//! Each collection is one key holding one serialized blob. The substrate is
//! synchronous and process-local; concurrent external mutation is out of
//! scope (single-writer per process).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::debug;

/// Synchronous key-value text storage that survives restarts.
pub trait KvStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed substrate: one file per key under a data directory.
///
/// Writes go to a temp file first, then rename, so a crash mid-write never
/// leaves a truncated value behind.
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStorage for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        Ok(Some(raw))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        debug!(key, bytes = value.len(), "Persisted key");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(())
    }
}

/// In-memory substrate for tests.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStorage for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();

        assert!(kv.get("people").unwrap().is_none());
        kv.set("people", "[1,2,3]").unwrap();
        assert_eq!(kv.get("people").unwrap().as_deref(), Some("[1,2,3]"));

        kv.set("people", "[]").unwrap();
        assert_eq!(kv.get("people").unwrap().as_deref(), Some("[]"));

        kv.remove("people").unwrap();
        assert!(kv.get("people").unwrap().is_none());
        // Removing a missing key is not an error.
        kv.remove("people").unwrap();
    }

    #[test]
    fn test_file_kv_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let kv = FileKv::open(dir.path()).unwrap();
            kv.set("schedule", "{\"a\":1}").unwrap();
        }
        let kv = FileKv::open(dir.path()).unwrap();
        assert_eq!(kv.get("schedule").unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_memory_kv() {
        let kv = MemoryKv::new();
        kv.set("k", "v").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
        kv.remove("k").unwrap();
        assert!(kv.get("k").unwrap().is_none());
    }
}
