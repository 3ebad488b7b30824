//! Shared State Store
//!
//! The only channel between Holdfast's processes. The monitor, the report
//! compiler, the shield decision handler, and the main app never call each
//! other; they read and write keys here.
//!
//! ```text
//! monitor ──┐ estimate                       ┌── main app (reads, drains)
//! report  ──┼──────────► groups/<id>/*.json ◄─┤
//! shield  ──┘ pending rewards / counters     └── UI view-models
//! ```
//!
//! # Consistency
//!
//! - `get`/`put` are atomic per key and last-writer-wins across processes.
//! - Read-modify-write sequences (reward queue, daily counters, balance) run
//!   under a cross-process lock via [`SharedState::update`].
//! - An unreachable store is never fatal: [`open_shared_state`] returns an
//!   error the caller logs before carrying on with defaults.
//!
//! # Module Structure
//!
//! - [`keys`]: persisted key names
//! - `kv`: file and in-memory backends
//! - `lock`: lock-directory mutual exclusion
//! - `shared`: typed accessors

pub mod keys;
mod kv;
mod lock;
mod shared;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use lock::{StoreLock, STALE_LOCK_MS};
pub use shared::SharedState;

use std::sync::Arc;

use crate::config::HoldfastConfig;
use crate::error::{HoldfastError, Result};
use crate::storage::StorageConfig;

/// Opens the shared state for the first reachable app group.
///
/// A group that already has a container directory wins over one that would
/// have to be created, so a device still on a historical identifier keeps
/// reading its existing data.
pub fn open_shared_state(storage: &StorageConfig, config: &HoldfastConfig) -> Result<SharedState> {
    let groups = storage.app_groups();

    let existing = groups.iter().find(|group| storage.group_dir(group).is_dir());
    if let Some(group) = existing {
        match open_group(storage, config, group) {
            Ok(state) => return Ok(state),
            Err(e) => {
                tracing::debug!(group = %group, error = %e, "Existing app group not reachable");
            }
        }
    }

    let mut last_error = String::from("no app group identifiers configured");
    for group in groups {
        match open_group(storage, config, group) {
            Ok(state) => return Ok(state),
            Err(e) => {
                tracing::debug!(group = %group, error = %e, "App group not reachable");
                last_error = e.to_string();
            }
        }
    }

    Err(HoldfastError::StoreUnreachable {
        groups: groups.to_vec(),
        reason: last_error,
    })
}

fn open_group(
    storage: &StorageConfig,
    config: &HoldfastConfig,
    group: &str,
) -> Result<SharedState> {
    let store = FileStore::open(
        &storage.group_dir(group),
        &storage.group_lock_dir(group),
        config.lock_timeout(),
    )?;
    Ok(SharedState::new(Arc::new(store), group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_opens_primary_group_on_fresh_install() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        let state = open_shared_state(&storage, &HoldfastConfig::default()).unwrap();
        assert_eq!(state.app_group(), storage.app_groups()[0]);
    }

    #[test]
    fn test_prefers_existing_legacy_group() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_app_groups(
            temp.path().to_path_buf(),
            vec!["group.new".to_string(), "group.old".to_string()],
        );
        std::fs::create_dir_all(storage.group_dir("group.old")).unwrap();

        let state = open_shared_state(&storage, &HoldfastConfig::default()).unwrap();
        assert_eq!(state.app_group(), "group.old");
    }

    #[test]
    fn test_unreachable_when_root_is_a_file() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("not-a-dir");
        std::fs::write(&root, "x").unwrap();
        let storage = StorageConfig::with_root(PathBuf::from(&root));

        let err = open_shared_state(&storage, &HoldfastConfig::default()).unwrap_err();
        assert!(matches!(err, HoldfastError::StoreUnreachable { .. }));
    }
}
