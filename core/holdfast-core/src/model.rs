//! Data shared between processes through the store.
//!
//! Every process holds only transient copies of these; the store owns the
//! persisted state.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder id written when the host could not identify an app.
pub const UNKNOWN_APP_ID: &str = "nil";

/// Minutes of usage per score step.
const SCORE_STEP_MINUTES: u64 = 30;
const SCORE_STEP_POINTS: u64 = 10;

/// Today's best usage estimate. Overwritten in place; no history is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageAggregate {
    /// Seconds of screen time.
    pub total_duration: f64,
    pub app_count: u32,
    /// Always derived from `total_duration` via [`usage_score`].
    pub usage_score: u8,
    /// `lastScreenTimeUpdate`.
    pub updated_at: Option<DateTime<Utc>>,
    /// `dataUpdateTimestamp`, epoch seconds.
    pub source_timestamp: Option<f64>,
}

impl UsageAggregate {
    /// Builds an aggregate stamped at `now`, deriving the score.
    pub fn measured(total_duration: f64, app_count: u32, now: DateTime<Utc>) -> Self {
        let total_duration = total_duration.max(0.0);
        Self {
            total_duration,
            app_count,
            usage_score: usage_score(total_duration),
            updated_at: Some(now),
            source_timestamp: Some(epoch_seconds(now)),
        }
    }

    /// The most recent freshness marker. `dataUpdateTimestamp` wins when present.
    pub fn freshness_marker(&self) -> Option<DateTime<Utc>> {
        self.source_timestamp
            .and_then(from_epoch_seconds)
            .or(self.updated_at)
    }

    /// True when neither freshness marker was ever written.
    pub fn is_unmeasured(&self) -> bool {
        self.updated_at.is_none() && self.source_timestamp.is_none()
    }
}

impl Default for UsageAggregate {
    fn default() -> Self {
        Self {
            total_duration: 0.0,
            app_count: 0,
            usage_score: 100,
            updated_at: None,
            source_timestamp: None,
        }
    }
}

/// Per-app usage from an authoritative report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct AppUsageRecord {
    /// Bundle identifier, or [`UNKNOWN_APP_ID`].
    #[serde(rename = "id")]
    pub app_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Seconds.
    pub duration: f64,
}

/// A credit award waiting to be applied to the balance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct PendingReward {
    pub amount: u32,
    pub reason: String,
    /// Epoch seconds.
    #[serde(rename = "timestamp")]
    pub created_at: f64,
}

impl PendingReward {
    pub fn new(amount: u32, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            amount,
            reason: reason.into(),
            created_at: epoch_seconds(now),
        }
    }
}

/// How many times the user changed their mind on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyChangeMindCounter {
    /// Local start-of-day, epoch seconds.
    pub day_key: i64,
    pub count: u32,
}

/// Score out of 100, dropping 10 points per 30 whole minutes, floored at 0.
pub fn usage_score(total_duration: f64) -> u8 {
    let seconds = if total_duration.is_finite() && total_duration > 0.0 {
        total_duration as u64
    } else {
        0
    };
    let minutes = seconds / 60;
    let penalty = (minutes / SCORE_STEP_MINUTES).saturating_mul(SCORE_STEP_POINTS);
    100u64.saturating_sub(penalty) as u8
}

pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

pub fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis((secs * 1000.0).round() as i64)
}

/// Epoch seconds of local midnight for the day containing `at`.
pub fn day_start_epoch(at: DateTime<Utc>) -> i64 {
    day_start_epoch_in(at, &Local)
}

/// Same as [`day_start_epoch`] for an explicit timezone.
pub fn day_start_epoch_in<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> i64 {
    let local_date = at.with_timezone(tz).date_naive();
    let midnight = local_date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST jump; the UTC reading is close enough.
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}
