//! Key-value backends for the shared store.
//!
//! # File Layout
//!
//! ```text
//! ~/.holdfast/groups/
//! ├── group.com.holdfast.shared/
//! │   ├── totalScreenTime.json
//! │   ├── pendingGemRewards.json
//! │   └── ...
//! └── group.com.holdfast.shared.lock/   (only while a read-modify-write runs)
//! ```
//!
//! One file per key. A write goes to a temp file in the same directory and is
//! renamed over the target, so readers see either the old or the new value and
//! never a torn one. Writes to different keys never interfere, which is the
//! whole per-key atomicity contract; nothing spans multiple keys except
//! [`KeyValueStore::with_lock`].
//!
//! # Defensive Reads
//!
//! Any process may have written a file at any time:
//! - Missing file → absent
//! - Empty or corrupt JSON → absent (logged, never repaired)

use fs_err as fs;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;

use super::keys::is_valid_key;
use super::lock::StoreLock;
use crate::error::{HoldfastError, Result};

/// A durable key-value store shared by every process.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn put(&self, key: &str, value: Value) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;

    /// Runs `critical` while holding the store's cross-process lock.
    ///
    /// Plain `get`/`put` calls stay last-writer-wins; only code inside this
    /// section is serialized against other `with_lock` callers.
    fn with_lock(&self, critical: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

fn check_key(key: &str) -> Result<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(HoldfastError::InvalidKey(key.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed store
// ═══════════════════════════════════════════════════════════════════════════════

/// File-backed store for one app group.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock_dir: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    /// Opens (creating if needed) the container directory.
    pub fn open(dir: &Path, lock_dir: &Path, lock_timeout: Duration) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| HoldfastError::io("Failed to create app group directory", e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock_dir: lock_dir.to_path_buf(),
            lock_timeout,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        check_key(key)?;
        let path = self.key_path(key);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HoldfastError::io(format!("Failed to read key {}", key), e)),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Unreadable store value; treating as absent");
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        check_key(key)?;
        let content = serde_json::to_vec(&value)
            .map_err(|e| HoldfastError::json(format!("Failed to serialize key {}", key), e))?;

        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| HoldfastError::io("Failed to create temp file", e))?;
        temp_file
            .write_all(&content)
            .map_err(|e| HoldfastError::io(format!("Failed to write key {}", key), e))?;
        temp_file
            .flush()
            .map_err(|e| HoldfastError::io(format!("Failed to flush key {}", key), e))?;
        temp_file
            .persist(self.key_path(key))
            .map_err(|e| HoldfastError::io(format!("Failed to commit key {}", key), e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HoldfastError::io(format!("Failed to remove key {}", key), e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| HoldfastError::io("Failed to list app group directory", e))?;

        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .filter(|key| is_valid_key(key))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn with_lock(&self, critical: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _lock = StoreLock::acquire(&self.lock_dir, self.lock_timeout)?;
        critical()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-local store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
    critical: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        // A panicking writer cannot leave a half-written Value behind.
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        check_key(key)?;
        Ok(self.values().get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        check_key(key)?;
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.values().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.values().keys().cloned().collect())
    }

    fn with_lock(&self, critical: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _guard = self.critical.lock().unwrap_or_else(|e| e.into_inner());
        critical()
    }
}
