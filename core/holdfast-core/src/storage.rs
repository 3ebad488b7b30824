//! Storage configuration and path management for Holdfast.
//!
//! Every extension process (monitor, report, shield decision) and the main app
//! resolve their shared directories through `StorageConfig`. Production code
//! uses `StorageConfig::default()`, which points at `~/.holdfast/` (or
//! `$HOLDFAST_HOME`). Tests use `StorageConfig::with_root(temp_dir)`.
//!
//! ## App Groups
//!
//! Shared state lives under `groups/<app-group-id>/`. Older builds shipped with
//! different group identifiers, so the list is ordered: the current identifier
//! first, then historical ones. The store opener walks this list and uses the
//! first group directory it can reach.

use std::env;
use std::path::{Path, PathBuf};

/// Current app-group identifier.
pub const PRIMARY_APP_GROUP: &str = "group.com.holdfast.shared";

/// Identifiers used by earlier releases. Tried after the primary one.
pub const LEGACY_APP_GROUPS: &[&str] = &["group.com.holdfast.app", "group.holdfast"];

const ROOT_ENV_VAR: &str = "HOLDFAST_HOME";

/// Central configuration for all Holdfast storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all Holdfast data (default: ~/.holdfast)
    root: PathBuf,
    /// App-group identifiers, current first.
    app_groups: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = env::var_os(ROOT_ENV_VAR)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".holdfast")))
            .unwrap_or_else(|| env::temp_dir().join("holdfast"));
        Self::with_root(root)
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory and the default
    /// app-group list.
    pub fn with_root(root: PathBuf) -> Self {
        let app_groups = std::iter::once(PRIMARY_APP_GROUP)
            .chain(LEGACY_APP_GROUPS.iter().copied())
            .map(str::to_string)
            .collect();
        Self { root, app_groups }
    }

    /// Creates a StorageConfig with an explicit app-group list.
    pub fn with_app_groups(root: PathBuf, app_groups: Vec<String>) -> Self {
        Self { root, app_groups }
    }

    /// Returns the root directory for Holdfast data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// App-group identifiers in lookup order.
    pub fn app_groups(&self) -> &[String] {
        &self.app_groups
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.json (preferences).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Parent directory of every app-group container.
    pub fn groups_dir(&self) -> PathBuf {
        self.root.join("groups")
    }

    /// Container directory for one app group. Each key is one file in here.
    pub fn group_dir(&self, app_group: &str) -> PathBuf {
        self.groups_dir().join(app_group)
    }

    /// Lock directory guarding read-modify-write sequences within a group.
    pub fn group_lock_dir(&self, app_group: &str) -> PathBuf {
        self.groups_dir().join(format!("{}.lock", app_group))
    }

    /// Path to logs/ directory (extension process logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
