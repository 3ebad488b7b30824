//! Usage Aggregator (monitor process).
//!
//! The monitor process is woken by schedule and threshold callbacks but can
//! never see per-app history. On every callback it writes a coarse estimate
//! so the main app has a recent liveness signal between authoritative reports.
//!
//! ## Estimate Ladder
//!
//! Exactly one rung applies per callback:
//!
//! ```text
//! activities enumerated (n ≥ 1)  → duration = 900s × n, apps = n
//! enumerated, none configured    → duration = 300s,     apps = 1
//! enumeration failed             → duration = 600s,     apps = 1
//! ```
//!
//! The result overwrites the aggregate; nothing accumulates across callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HoldfastError, Result};
use crate::model::UsageAggregate;
use crate::store::{keys, SharedState};

const SECONDS_PER_ACTIVITY: f64 = 900.0;
const PRESENCE_ONLY_SECONDS: f64 = 300.0;
const DEGRADED_SECONDS: f64 = 600.0;

/// Callbacks delivered to the monitor process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorEvent {
    IntervalDidStart,
    IntervalDidEnd,
    EventDidReachThreshold,
    IntervalWillStartWarning,
    IntervalWillEndWarning,
}

impl MonitorEvent {
    pub const ALL: [MonitorEvent; 5] = [
        MonitorEvent::IntervalDidStart,
        MonitorEvent::IntervalDidEnd,
        MonitorEvent::EventDidReachThreshold,
        MonitorEvent::IntervalWillStartWarning,
        MonitorEvent::IntervalWillEndWarning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorEvent::IntervalDidStart => "interval-did-start",
            MonitorEvent::IntervalDidEnd => "interval-did-end",
            MonitorEvent::EventDidReachThreshold => "event-did-reach-threshold",
            MonitorEvent::IntervalWillStartWarning => "interval-will-start-warning",
            MonitorEvent::IntervalWillEndWarning => "interval-will-end-warning",
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorEvent {
    type Err = HoldfastError;

    fn from_str(s: &str) -> Result<Self> {
        MonitorEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| HoldfastError::InvalidInput(format!("unknown monitor event: {}", s)))
    }
}

/// Lists the activities the main app asked the monitor to watch.
pub trait ActivitySource {
    fn monitored_activities(&self) -> Result<Vec<String>>;
}

/// Activities handed to the process directly (e.g. on the command line).
#[derive(Debug, Clone, Default)]
pub struct FixedActivities(pub Vec<String>);

impl ActivitySource for FixedActivities {
    fn monitored_activities(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Activities the main app published under `monitoredActivities`.
#[derive(Debug, Clone)]
pub struct StoredActivities {
    state: SharedState,
}

impl StoredActivities {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl ActivitySource for StoredActivities {
    fn monitored_activities(&self) -> Result<Vec<String>> {
        self.state
            .get::<Vec<String>>(keys::MONITORED_ACTIVITIES)
            .map(Option::unwrap_or_default)
            .map_err(|e| HoldfastError::EnumerationFailed(e.to_string()))
    }
}

/// Publishes the monitored activity list for the monitor process.
pub fn publish_monitored_activities(state: &SharedState, activities: &[String]) -> Result<()> {
    state.put(keys::MONITORED_ACTIVITIES, activities)
}

/// Which rung of the ladder produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    PerActivity { activities: u32 },
    PresenceOnly,
    Degraded,
}

impl Estimate {
    pub fn from_enumeration(enumerated: &Result<Vec<String>>) -> Self {
        match enumerated {
            Ok(activities) if !activities.is_empty() => Estimate::PerActivity {
                activities: u32::try_from(activities.len()).unwrap_or(u32::MAX),
            },
            Ok(_) => Estimate::PresenceOnly,
            Err(_) => Estimate::Degraded,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            Estimate::PerActivity { activities } => SECONDS_PER_ACTIVITY * f64::from(*activities),
            Estimate::PresenceOnly => PRESENCE_ONLY_SECONDS,
            Estimate::Degraded => DEGRADED_SECONDS,
        }
    }

    pub fn app_count(&self) -> u32 {
        match self {
            Estimate::PerActivity { activities } => *activities,
            Estimate::PresenceOnly | Estimate::Degraded => 1,
        }
    }

    pub fn to_aggregate(self, now: DateTime<Utc>) -> UsageAggregate {
        UsageAggregate::measured(self.duration(), self.app_count(), now)
    }
}

/// Writes estimate aggregates on monitor callbacks.
#[derive(Debug, Clone)]
pub struct UsageAggregator {
    state: SharedState,
}

impl UsageAggregator {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Computes this callback's estimate and overwrites the aggregate with it.
    ///
    /// Returns the aggregate that was written.
    pub fn handle_event(
        &self,
        event: MonitorEvent,
        source: &dyn ActivitySource,
        now: DateTime<Utc>,
    ) -> Result<UsageAggregate> {
        let enumerated = source.monitored_activities();
        if let Err(e) = &enumerated {
            tracing::warn!(
                event = %event,
                error = %e,
                "Activity enumeration failed; using degraded estimate"
            );
        }

        let estimate = Estimate::from_enumeration(&enumerated);
        let aggregate = estimate.to_aggregate(now);
        self.state.write_aggregate(&aggregate)?;

        tracing::info!(
            event = %event,
            rung = ?estimate,
            duration = aggregate.total_duration,
            apps = aggregate.app_count,
            score = aggregate.usage_score,
            "Usage estimate written"
        );
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FailingSource;

    impl ActivitySource for FailingSource {
        fn monitored_activities(&self) -> Result<Vec<String>> {
            Err(HoldfastError::EnumerationFailed("denied".into()))
        }
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, secs).unwrap()
    }

    #[test]
    fn test_event_names_parse() {
        for event in MonitorEvent::ALL {
            assert_eq!(event.as_str().parse::<MonitorEvent>().unwrap(), event);
        }
        assert!("interval-did-pause".parse::<MonitorEvent>().is_err());
    }

    #[test]
    fn test_per_activity_rung() {
        let state = SharedState::in_memory();
        let aggregator = UsageAggregator::new(state.clone());
        let source = FixedActivities(vec!["social".into(), "games".into()]);

        let written = aggregator
            .handle_event(MonitorEvent::IntervalDidStart, &source, at(0))
            .unwrap();
        assert_eq!(written.total_duration, 1800.0);
        assert_eq!(written.app_count, 2);
        assert_eq!(written.usage_score, 90);
        assert_eq!(state.read_aggregate().unwrap(), written);
    }

    #[test]
    fn test_single_activity_estimate() {
        let estimate = Estimate::PerActivity { activities: 1 };
        assert_eq!(estimate.duration(), 900.0);
        assert_eq!(estimate.app_count(), 1);
        assert_eq!(estimate.to_aggregate(at(0)).usage_score, 100);
    }

    #[test]
    fn test_presence_only_rung_is_idempotent() {
        let state = SharedState::in_memory();
        let aggregator = UsageAggregator::new(state.clone());
        let none = FixedActivities::default();

        let first = aggregator
            .handle_event(MonitorEvent::EventDidReachThreshold, &none, at(0))
            .unwrap();
        let second = aggregator
            .handle_event(MonitorEvent::EventDidReachThreshold, &none, at(1))
            .unwrap();

        assert_eq!((first.total_duration, first.app_count), (300.0, 1));
        assert_eq!((second.total_duration, second.app_count), (300.0, 1));
        let stored = state.read_aggregate().unwrap();
        assert_eq!((stored.total_duration, stored.app_count), (300.0, 1));
        assert_eq!(stored.updated_at, Some(at(1)));
    }

    #[test]
    fn test_degraded_rung_on_enumeration_failure() {
        let state = SharedState::in_memory();
        let aggregator = UsageAggregator::new(state);

        let written = aggregator
            .handle_event(MonitorEvent::IntervalDidEnd, &FailingSource, at(0))
            .unwrap();
        assert_eq!((written.total_duration, written.app_count), (600.0, 1));
    }

    #[test]
    fn test_estimate_overwrites_previous_estimate() {
        let state = SharedState::in_memory();
        let aggregator = UsageAggregator::new(state.clone());
        let three = FixedActivities(vec!["a".into(), "b".into(), "c".into()]);

        aggregator
            .handle_event(MonitorEvent::IntervalDidStart, &three, at(0))
            .unwrap();
        aggregator
            .handle_event(MonitorEvent::IntervalWillEndWarning, &FixedActivities::default(), at(5))
            .unwrap();

        let stored = state.read_aggregate().unwrap();
        assert_eq!((stored.total_duration, stored.app_count), (300.0, 1));
    }

    #[test]
    fn test_stored_activities_source() {
        let state = SharedState::in_memory();
        let source = StoredActivities::new(state.clone());
        assert!(source.monitored_activities().unwrap().is_empty());

        publish_monitored_activities(&state, &["social".to_string()]).unwrap();
        assert_eq!(source.monitored_activities().unwrap(), vec!["social"]);
    }
}
