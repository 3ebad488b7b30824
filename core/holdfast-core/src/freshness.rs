//! Freshness Arbiter (main process).
//!
//! Estimates and authoritative reports overwrite the same record, so the
//! arbiter never compares sources. It only asks how old the newest write is.
//!
//! ```text
//! no freshness marker              → NoData   ("no data yet")
//! marker older than the threshold  → Stale    (values shown, flagged)
//! otherwise                        → Fresh
//! ```
//!
//! A zero that was never measured must not look like a measured zero; that
//! distinction comes from the marker, never from the values.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::model::UsageAggregate;
use crate::store::SharedState;

/// How far the arbiter trusts the stored aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    NoData,
    Stale {
        aggregate: UsageAggregate,
        age: Duration,
    },
    Fresh {
        aggregate: UsageAggregate,
        age: Duration,
    },
}

impl Freshness {
    pub fn status(&self) -> UsageStatus {
        match self {
            Freshness::NoData => UsageStatus::NoData,
            Freshness::Stale { .. } => UsageStatus::Stale,
            Freshness::Fresh { .. } => UsageStatus::Fresh,
        }
    }

    pub fn aggregate(&self) -> Option<&UsageAggregate> {
        match self {
            Freshness::NoData => None,
            Freshness::Stale { aggregate, .. } | Freshness::Fresh { aggregate, .. } => {
                Some(aggregate)
            }
        }
    }
}

/// Display state for the usage card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum UsageStatus {
    NoData,
    Stale,
    Fresh,
}

/// View-model for the main app's usage card.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct UsageSnapshot {
    pub status: UsageStatus,
    pub total_minutes: u32,
    pub app_count: u32,
    pub usage_score: u8,
    /// Seconds since the freshest write, when one exists.
    pub age_secs: Option<u64>,
    /// RFC 3339 timestamp of the freshest write.
    pub updated_at: Option<String>,
}

impl UsageSnapshot {
    pub fn no_data() -> Self {
        Self {
            status: UsageStatus::NoData,
            total_minutes: 0,
            app_count: 0,
            usage_score: 0,
            age_secs: None,
            updated_at: None,
        }
    }
}

/// Classifies stored aggregates against a staleness threshold.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessArbiter {
    staleness_threshold: Duration,
}

impl FreshnessArbiter {
    pub fn new(staleness_threshold: Duration) -> Self {
        Self {
            staleness_threshold,
        }
    }

    pub fn assess(&self, aggregate: UsageAggregate, now: DateTime<Utc>) -> Freshness {
        let Some(marker) = aggregate.freshness_marker() else {
            return Freshness::NoData;
        };

        // A marker from the future (clock skew between processes) counts as age zero.
        let age = (now - marker).to_std().unwrap_or(Duration::ZERO);
        if age > self.staleness_threshold {
            Freshness::Stale { aggregate, age }
        } else {
            Freshness::Fresh { aggregate, age }
        }
    }

    /// Reads the store and classifies. An unreadable store is `NoData`.
    pub fn read(&self, state: &SharedState, now: DateTime<Utc>) -> Freshness {
        match state.read_aggregate() {
            Ok(aggregate) => self.assess(aggregate, now),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read usage aggregate");
                Freshness::NoData
            }
        }
    }

    pub fn snapshot(&self, state: &SharedState, now: DateTime<Utc>) -> UsageSnapshot {
        snapshot_of(&self.read(state, now))
    }
}

pub fn snapshot_of(freshness: &Freshness) -> UsageSnapshot {
    let (status, aggregate, age) = match freshness {
        Freshness::NoData => return UsageSnapshot::no_data(),
        Freshness::Stale { aggregate, age } => (UsageStatus::Stale, aggregate, age),
        Freshness::Fresh { aggregate, age } => (UsageStatus::Fresh, aggregate, age),
    };

    UsageSnapshot {
        status,
        total_minutes: (aggregate.total_duration / 60.0).floor().min(f64::from(u32::MAX)) as u32,
        app_count: aggregate.app_count,
        usage_score: aggregate.usage_score,
        age_secs: Some(age.as_secs()),
        updated_at: aggregate.freshness_marker().map(|dt| dt.to_rfc3339()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn arbiter() -> FreshnessArbiter {
        FreshnessArbiter::new(Duration::from_secs(30 * 60))
    }

    #[test]
    fn test_never_written_is_no_data() {
        let freshness = arbiter().assess(UsageAggregate::default(), now());
        assert_eq!(freshness, Freshness::NoData);
        assert_eq!(snapshot_of(&freshness), UsageSnapshot::no_data());
    }

    #[test]
    fn test_recent_write_is_fresh() {
        let aggregate = UsageAggregate::measured(900.0, 1, now() - ChronoDuration::minutes(5));
        let freshness = arbiter().assess(aggregate, now());
        assert_eq!(freshness.status(), UsageStatus::Fresh);
        assert_eq!(snapshot_of(&freshness).age_secs, Some(300));
    }

    #[test]
    fn test_old_nonzero_write_is_stale() {
        let aggregate = UsageAggregate::measured(7200.0, 6, now() - ChronoDuration::hours(2));
        let freshness = arbiter().assess(aggregate, now());
        assert_eq!(freshness.status(), UsageStatus::Stale);

        let snapshot = snapshot_of(&freshness);
        assert_eq!(snapshot.status, UsageStatus::Stale);
        assert_eq!(snapshot.total_minutes, 120);
    }

    #[test]
    fn test_measured_zero_is_distinct_from_no_data() {
        let aggregate = UsageAggregate::measured(0.0, 0, now());
        let snapshot = snapshot_of(&arbiter().assess(aggregate, now()));
        assert_eq!(snapshot.status, UsageStatus::Fresh);
        assert_eq!(snapshot.app_count, 0);
        assert_eq!(snapshot.usage_score, 100);
    }

    #[test]
    fn test_future_marker_counts_as_fresh() {
        let aggregate = UsageAggregate::measured(60.0, 1, now() + ChronoDuration::seconds(30));
        let freshness = arbiter().assess(aggregate, now());
        assert_eq!(freshness.status(), UsageStatus::Fresh);
    }

    #[test]
    fn test_data_update_timestamp_wins_over_last_update() {
        let mut aggregate = UsageAggregate::measured(60.0, 1, now() - ChronoDuration::hours(3));
        aggregate.source_timestamp = Some((now() - ChronoDuration::minutes(1)).timestamp() as f64);
        assert_eq!(arbiter().assess(aggregate, now()).status(), UsageStatus::Fresh);
    }

    #[test]
    fn test_snapshot_reads_store() {
        let state = SharedState::in_memory();
        assert_eq!(arbiter().snapshot(&state, now()).status, UsageStatus::NoData);

        state
            .write_aggregate(&UsageAggregate::measured(1800.0, 2, now()))
            .unwrap();
        let snapshot = arbiter().snapshot(&state, now());
        assert_eq!(snapshot.status, UsageStatus::Fresh);
        assert_eq!(snapshot.total_minutes, 30);
        assert_eq!(snapshot.usage_score, 90);
    }
}
