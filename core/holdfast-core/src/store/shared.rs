//! Typed access to the shared store.
//!
//! `SharedState` is the only way the rest of the crate touches persisted
//! values. It knows how each key is encoded and how the multi-key usage
//! aggregate is laid out.
//!
//! # Aggregate Layout
//!
//! The aggregate spans five keys with no transaction across them. Writers put
//! the value fields first and the two timestamps last, and readers recompute
//! `usageScore` from `totalScreenTime`. Any interleaving of two writers
//! therefore reads back as a valid aggregate (possibly mixing the two), and a
//! freshness marker is never visible before the values it vouches for.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use super::keys;
use super::kv::{KeyValueStore, MemoryStore};
use crate::error::{HoldfastError, Result};
use crate::model::{from_epoch_seconds, usage_score, AppUsageRecord, UsageAggregate};

/// Handle to one app group's shared state.
#[derive(Clone)]
pub struct SharedState {
    store: Arc<dyn KeyValueStore>,
    app_group: String,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("app_group", &self.app_group)
            .finish_non_exhaustive()
    }
}

impl SharedState {
    pub fn new(store: Arc<dyn KeyValueStore>, app_group: impl Into<String>) -> Self {
        Self {
            store,
            app_group: app_group.into(),
        }
    }

    /// Process-local state for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), "memory")
    }

    pub fn app_group(&self) -> &str {
        &self.app_group
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Generic access
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reads and decodes a key. Undecodable values are reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                tracing::warn!(
                    key,
                    error = %e,
                    "Stored value has unexpected shape; treating as absent"
                );
                Ok(None)
            }
        }
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| HoldfastError::json(format!("Failed to encode key {}", key), e))?;
        self.store.put(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.store.keys()
    }

    /// Runs `critical` under the cross-process lock and returns its result.
    pub fn locked<R>(&self, critical: impl FnOnce(&SharedState) -> Result<R>) -> Result<R> {
        let mut critical = Some(critical);
        let mut output = None;
        self.store.with_lock(&mut || {
            if let Some(run) = critical.take() {
                output = Some(run(self)?);
            }
            Ok(())
        })?;
        output.ok_or_else(|| HoldfastError::InvalidInput("critical section did not run".into()))
    }

    /// Atomic read-modify-write of a single key.
    ///
    /// `modify` receives the current value and returns the value to store
    /// (`None` removes the key) along with a result for the caller.
    pub fn update<T, R>(
        &self,
        key: &str,
        modify: impl FnOnce(Option<T>) -> (Option<T>, R),
    ) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        self.locked(|state| {
            let current = state.get::<T>(key)?;
            let (next, output) = modify(current);
            match next {
                Some(value) => state.put(key, &value)?,
                None => state.remove(key)?,
            }
            Ok(output)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Usage aggregate
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reads the aggregate. Missing fields take their zero/absent defaults.
    pub fn read_aggregate(&self) -> Result<UsageAggregate> {
        let total_duration = self
            .get::<f64>(keys::TOTAL_SCREEN_TIME)?
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0);
        let app_count = self.get::<u32>(keys::TOTAL_APP_COUNT)?.unwrap_or(0);
        let updated_at = self.get::<DateTime<Utc>>(keys::LAST_SCREEN_TIME_UPDATE)?;
        let source_timestamp = self
            .get::<f64>(keys::DATA_UPDATE_TIMESTAMP)?
            .filter(|ts| from_epoch_seconds(*ts).is_some());

        Ok(UsageAggregate {
            total_duration,
            app_count,
            usage_score: usage_score(total_duration),
            updated_at,
            source_timestamp,
        })
    }

    /// Overwrites the aggregate in place: values first, timestamps last.
    pub fn write_aggregate(&self, aggregate: &UsageAggregate) -> Result<()> {
        self.put(keys::TOTAL_SCREEN_TIME, &aggregate.total_duration)?;
        self.put(keys::TOTAL_APP_COUNT, &aggregate.app_count)?;
        self.put(keys::USAGE_SCORE, &usage_score(aggregate.total_duration))?;
        if let Some(updated_at) = aggregate.updated_at {
            self.put(keys::LAST_SCREEN_TIME_UPDATE, &updated_at)?;
        }
        if let Some(source_timestamp) = aggregate.source_timestamp {
            self.put(keys::DATA_UPDATE_TIMESTAMP, &source_timestamp)?;
        }
        Ok(())
    }

    pub fn read_app_reports(&self) -> Result<Vec<AppUsageRecord>> {
        Ok(self
            .get::<Vec<AppUsageRecord>>(keys::APP_REPORTS_DATA)?
            .unwrap_or_default())
    }

    pub fn write_app_reports(&self, records: &[AppUsageRecord]) -> Result<()> {
        self.put(keys::APP_REPORTS_DATA, records)
    }
}
