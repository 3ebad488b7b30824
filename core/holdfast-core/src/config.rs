//! Preference loading and saving.
//!
//! Preferences live in `<root>/config.json`. A missing or corrupt file yields
//! defaults; no extension process should fail because of a bad config.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{HoldfastError, Result};
use crate::storage::StorageConfig;

/// Tunables shared by every process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct HoldfastConfig {
    /// Aggregates whose freshness marker is older than this are flagged stale.
    pub staleness_threshold_secs: u64,
    /// How many days of change-mind counters to keep.
    pub counter_retention_days: u32,
    /// Delay before the "still want to continue?" follow-up prompt.
    pub continue_followup_delay_secs: u64,
    /// Delay before the reward confirmation prompt.
    pub change_mind_confirmation_delay_secs: u64,
    /// Upper bound on waiting for the shared store lock.
    pub lock_timeout_ms: u64,
}

impl Default for HoldfastConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: 30 * 60,
            counter_retention_days: 7,
            continue_followup_delay_secs: 10 * 60,
            change_mind_confirmation_delay_secs: 1,
            lock_timeout_ms: 2_000,
        }
    }
}

impl HoldfastConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Loads preferences, returning defaults if the file is missing or unreadable.
pub fn load_config(storage: &StorageConfig) -> HoldfastConfig {
    let path = storage.config_file();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return HoldfastConfig::default()
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read config; using defaults");
            return HoldfastConfig::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "Malformed config; using defaults"
            );
            HoldfastConfig::default()
        }
    }
}

/// Saves preferences to disk.
pub fn save_config(storage: &StorageConfig, config: &HoldfastConfig) -> Result<()> {
    let path = storage.config_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| HoldfastError::io("Failed to create config directory", e))?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| HoldfastError::json("Failed to serialize config", e))?;
    fs::write(&path, content).map_err(|e| HoldfastError::io("Failed to write config", e))
}
