//! Several "processes" (threads with their own store handles) sharing one
//! app-group directory, the way the extensions and the main app do.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use holdfast_core::{
    open_shared_state, ActivityReportCompiler, AppActivity, CategoryUsage, FixedActivities,
    FreshnessArbiter, HoldfastConfig, MonitorEvent, RewardLedger, SharedState, StorageConfig,
    UsageAggregator, UsageBatch, UsageSegment, UsageStatus,
};
use std::collections::HashSet;
use std::thread;
use tempfile::TempDir;

fn config() -> HoldfastConfig {
    HoldfastConfig {
        lock_timeout_ms: 10_000,
        ..HoldfastConfig::default()
    }
}

fn open(storage: &StorageConfig) -> SharedState {
    open_shared_state(storage, &config()).unwrap()
}

fn batch(apps: &[(&str, f64)]) -> UsageBatch {
    UsageBatch {
        segments: vec![UsageSegment {
            interval_start: None,
            interval_end: None,
            categories: vec![CategoryUsage {
                name: Some("All".to_string()),
                apps: apps
                    .iter()
                    .map(|(id, duration)| AppActivity {
                        bundle_id: Some(id.to_string()),
                        display_name: Some(id.to_string()),
                        duration: *duration,
                    })
                    .collect(),
            }],
        }],
    }
}

#[test]
fn test_authoritative_report_replaces_estimate_without_merging() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
    let t1 = t0 + ChronoDuration::seconds(5);

    let monitor = UsageAggregator::new(open(&storage));
    let estimate = monitor
        .handle_event(
            MonitorEvent::IntervalDidStart,
            &FixedActivities(vec!["social".to_string()]),
            t0,
        )
        .unwrap();
    assert_eq!(estimate.total_duration, 900.0);
    assert_eq!(estimate.app_count, 1);

    let reporter = ActivityReportCompiler::new(open(&storage));
    reporter
        .compile_and_commit(vec![Ok(batch(&[("com.a", 1200.0), ("com.b", 600.0)]))], || t1)
        .unwrap();

    let main_app = open(&storage);
    let aggregate = main_app.read_aggregate().unwrap();
    assert_eq!(aggregate.total_duration, 1800.0);
    assert_eq!(aggregate.app_count, 2);
    assert_eq!(aggregate.freshness_marker(), Some(t1));

    let freshness = FreshnessArbiter::new(config().staleness_threshold()).read(&main_app, t1);
    assert_eq!(freshness.status(), UsageStatus::Fresh);
}

#[test]
fn test_old_report_reads_stale_with_values() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let written = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

    ActivityReportCompiler::new(open(&storage))
        .compile_and_commit(vec![Ok(batch(&[("com.a", 5400.0)]))], || written)
        .unwrap();

    let arbiter = FreshnessArbiter::new(config().staleness_threshold());
    let snapshot = arbiter.snapshot(&open(&storage), written + ChronoDuration::hours(3));
    assert_eq!(snapshot.status, UsageStatus::Stale);
    assert_eq!(snapshot.total_minutes, 90);
    assert_eq!(snapshot.app_count, 1);
}

#[test]
fn test_concurrent_appends_and_drains_deliver_each_reward_once() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    const WRITERS: u32 = 3;
    const PER_WRITER: u32 = 15;

    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let storage = storage.clone();
            thread::spawn(move || {
                let ledger = RewardLedger::new(open(&storage), &config());
                for n in 0..PER_WRITER {
                    ledger
                        .append_pending(1, &format!("{}-{}", writer, n), Utc::now())
                        .unwrap();
                }
            })
        })
        .collect();

    let drainer = {
        let storage = storage.clone();
        thread::spawn(move || {
            let ledger = RewardLedger::new(open(&storage), &config());
            let mut seen = Vec::new();
            for _ in 0..20 {
                seen.extend(ledger.apply_pending_to_balance().unwrap().rewards);
                thread::yield_now();
            }
            seen
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    let mut delivered = drainer.join().unwrap();

    let ledger = RewardLedger::new(open(&storage), &config());
    delivered.extend(ledger.apply_pending_to_balance().unwrap().rewards);

    let total = (WRITERS * PER_WRITER) as usize;
    assert_eq!(delivered.len(), total);
    let unique: HashSet<_> = delivered.iter().map(|r| r.reason.clone()).collect();
    assert_eq!(unique.len(), total);
    assert_eq!(ledger.balance().unwrap(), total as u64);
    assert!(ledger.pending().unwrap().is_empty());
}

#[test]
fn test_concurrent_appends_and_drain_all_lose_nothing() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    const WRITERS: u32 = 4;
    const PER_WRITER: u32 = 20;

    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let storage = storage.clone();
            thread::spawn(move || {
                let ledger = RewardLedger::new(open(&storage), &config());
                for n in 0..PER_WRITER {
                    ledger
                        .append_pending(2, &format!("w{}-{}", writer, n), Utc::now())
                        .unwrap();
                    thread::yield_now();
                }
            })
        })
        .collect();

    let drainers: Vec<_> = (0..2)
        .map(|_| {
            let storage = storage.clone();
            thread::spawn(move || {
                let ledger = RewardLedger::new(open(&storage), &config());
                let mut seen = Vec::new();
                for _ in 0..30 {
                    seen.extend(ledger.drain_all().unwrap());
                    thread::yield_now();
                }
                seen
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    let mut delivered = Vec::new();
    for drainer in drainers {
        delivered.extend(drainer.join().unwrap());
    }

    let ledger = RewardLedger::new(open(&storage), &config());
    delivered.extend(ledger.drain_all().unwrap());

    let total = (WRITERS * PER_WRITER) as usize;
    assert_eq!(delivered.len(), total);
    let unique: HashSet<_> = delivered.iter().map(|r| r.reason.clone()).collect();
    assert_eq!(unique.len(), total);
    assert!(delivered.iter().all(|r| r.amount == 2));
    assert!(ledger.pending().unwrap().is_empty());
    // Draining alone never credits the balance.
    assert_eq!(ledger.balance().unwrap(), 0);
}

#[test]
fn test_concurrent_change_mind_increments_are_not_lost() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let now = Utc::now();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let storage = storage.clone();
            thread::spawn(move || {
                let ledger = RewardLedger::new(open(&storage), &config());
                (0..10)
                    .map(|_| ledger.record_change_mind(now).unwrap().count)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut before_counts: Vec<u32> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    before_counts.sort_unstable();

    assert_eq!(before_counts, (0..40).collect::<Vec<_>>());
    let ledger = RewardLedger::new(open(&storage), &config());
    assert_eq!(ledger.change_mind_count(now).unwrap().count, 40);
}
