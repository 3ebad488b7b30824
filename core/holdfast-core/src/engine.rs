//! WellbeingEngine - the main app's entry point.
//!
//! The engine is what the host UI binds to. It only reads aggregate keys; the
//! writes it performs are the reward drain, the monitored-activity list, and
//! consuming unblock prompt requests.
//!
//! - **Synchronous**: No async runtime required
//! - **Stateless**: The store is reopened per call, so a transiently
//!   unreachable app group recovers on the next call
//! - **Never fatal**: An unreachable store reads as "no data yet"
//!
//! ```rust,ignore
//! use holdfast_core::WellbeingEngine;
//!
//! let engine = WellbeingEngine::new();
//! let snapshot = engine.usage_snapshot();
//! let drained = engine.apply_pending_rewards()?;
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::thread;

use crate::aggregator::publish_monitored_activities;
use crate::config::{load_config, HoldfastConfig};
use crate::error::HoldfastFfiError;
use crate::freshness::{FreshnessArbiter, UsageSnapshot};
use crate::ledger::{DrainSummary, RewardLedger};
use crate::model::AppUsageRecord;
use crate::router::take_unblock_request;
use crate::storage::StorageConfig;
use crate::store::{open_shared_state, SharedState};

#[derive(uniffi::Object)]
pub struct WellbeingEngine {
    storage: StorageConfig,
    config: HoldfastConfig,
}

impl WellbeingEngine {
    /// Creates an engine over custom storage. Not exposed to FFI.
    pub fn with_storage(storage: StorageConfig) -> Self {
        let config = load_config(&storage);
        Self { storage, config }
    }

    pub fn with_config(storage: StorageConfig, config: HoldfastConfig) -> Self {
        Self { storage, config }
    }

    /// Opens the shared state, logging (not returning) an unreachable store.
    pub fn shared_state(&self) -> Option<SharedState> {
        match open_shared_state(&self.storage, &self.config) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(error = %e, "Shared store unreachable; using defaults");
                None
            }
        }
    }

    fn ledger(&self) -> Option<RewardLedger> {
        self.shared_state()
            .map(|state| RewardLedger::new(state, &self.config))
    }

    /// Drains pending rewards off the calling thread.
    pub fn spawn_reward_drain(self: Arc<Self>) -> thread::JoinHandle<Option<DrainSummary>> {
        thread::spawn(move || match self.apply_pending_rewards() {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(error = %e, "Background reward drain failed");
                None
            }
        })
    }
}

#[uniffi::export]
impl WellbeingEngine {
    /// Creates an engine with the default storage location.
    #[uniffi::constructor]
    pub fn new() -> Self {
        Self::with_storage(StorageConfig::default())
    }

    pub fn config(&self) -> HoldfastConfig {
        self.config.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Usage
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current usage card state. Missing or unreachable data is `NoData`.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let Some(state) = self.shared_state() else {
            return UsageSnapshot::no_data();
        };
        FreshnessArbiter::new(self.config.staleness_threshold()).snapshot(&state, Utc::now())
    }

    /// Per-app records from the last authoritative report, longest first.
    pub fn app_reports(&self) -> Vec<AppUsageRecord> {
        let Some(state) = self.shared_state() else {
            return Vec::new();
        };
        let mut records = state.read_app_reports().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read app reports");
            Vec::new()
        });
        records.sort_by(|a, b| b.duration.total_cmp(&a.duration));
        records
    }

    /// Publishes the activities the monitor process should estimate from.
    pub fn set_monitored_activities(
        &self,
        activities: Vec<String>,
    ) -> Result<(), HoldfastFfiError> {
        let state = self
            .shared_state()
            .ok_or_else(|| HoldfastFfiError::from("Shared store unreachable"))?;
        publish_monitored_activities(&state, &activities).map_err(HoldfastFfiError::from)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Rewards
    // ─────────────────────────────────────────────────────────────────────────────

    /// Moves every pending reward into the balance, exactly once.
    pub fn apply_pending_rewards(&self) -> Result<DrainSummary, HoldfastFfiError> {
        let ledger = self
            .ledger()
            .ok_or_else(|| HoldfastFfiError::from("Shared store unreachable"))?;
        ledger
            .apply_pending_to_balance()
            .map_err(HoldfastFfiError::from)
    }

    pub fn gem_balance(&self) -> u64 {
        self.ledger()
            .and_then(|ledger| ledger.balance().ok())
            .unwrap_or(0)
    }

    pub fn change_mind_count_today(&self) -> u32 {
        self.ledger()
            .and_then(|ledger| ledger.change_mind_count(Utc::now()).ok())
            .map(|counter| counter.count)
            .unwrap_or(0)
    }

    /// Removes expired per-day counter keys. Returns how many were removed.
    pub fn prune_legacy_counters(&self) -> u32 {
        let Some(ledger) = self.ledger() else {
            return 0;
        };
        match ledger.prune_legacy_counters(Utc::now()) {
            Ok(removed) => u32::try_from(removed).unwrap_or(u32::MAX),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prune legacy counters");
                0
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Shield prompts
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the app name if a shield asked for the decision prompt.
    pub fn take_unblock_request(&self) -> Option<String> {
        let state = self.shared_state()?;
        take_unblock_request(&state).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read unblock request");
            None
        })
    }
}
