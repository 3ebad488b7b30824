//! Activity Report Compiler (reporting process).
//!
//! The host hands the reporting process a lazy sequence of usage batches.
//! Each batch nests segments → categories → apps. The compiler drains the
//! whole sequence, then makes one authoritative write that supersedes the
//! monitor's estimate.
//!
//! ## Rules
//!
//! - Every app leaf becomes an [`AppUsageRecord`], zero-duration apps included.
//! - Repeated (id, name) pairs within one pass fold into one record.
//! - A missing bundle id is stored as the literal `"nil"`.
//! - No store write happens while the sequence is being pulled; each `next()`
//!   may block on the host.
//! - Any error from the sequence aborts the pass with nothing written, leaving
//!   the previous aggregate in force.
//! - An empty sequence still commits (`appCount = 0`): measured, nothing used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;

use crate::error::{HoldfastError, Result};
use crate::model::{AppUsageRecord, UsageAggregate, UNKNOWN_APP_ID};
use crate::store::SharedState;

const UNKNOWN_APP_NAME: &str = "Unknown App";

// ═══════════════════════════════════════════════════════════════════════════════
// Host schema
// ═══════════════════════════════════════════════════════════════════════════════

/// One result batch delivered by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageBatch {
    #[serde(default)]
    pub segments: Vec<UsageSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSegment {
    #[serde(default)]
    pub interval_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: Vec<CategoryUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryUsage {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub apps: Vec<AppActivity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppActivity {
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
}

/// Reads newline-delimited JSON batches. Blank lines are skipped; a read or
/// parse failure surfaces as a stream error.
pub fn batches_from_reader<R: BufRead>(reader: R) -> impl Iterator<Item = Result<UsageBatch>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str::<UsageBatch>(&line).map_err(|e| {
                HoldfastError::ReportStream(format!("batch {} is malformed: {}", index + 1, e))
            })),
            Err(e) => Some(Err(HoldfastError::ReportStream(format!(
                "failed to read batch {}: {}",
                index + 1,
                e
            )))),
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Compilation
// ═══════════════════════════════════════════════════════════════════════════════

/// Totals reduced from one full pass over the host sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityReport {
    pub total_activity_duration: f64,
    pub apps: Vec<AppUsageRecord>,
}

impl ActivityReport {
    pub fn app_count(&self) -> u32 {
        u32::try_from(self.apps.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Default)]
struct Accumulator {
    total: f64,
    apps: Vec<AppUsageRecord>,
    index: HashMap<(String, String), usize>,
}

impl Accumulator {
    fn add(&mut self, app: AppActivity) {
        let duration = if app.duration.is_finite() && app.duration > 0.0 {
            app.duration
        } else {
            0.0
        };
        let app_id = app
            .bundle_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| UNKNOWN_APP_ID.to_string());
        let display_name = app
            .display_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_APP_NAME.to_string());

        self.total += duration;
        let key = (app_id, display_name);
        match self.index.get(&key) {
            Some(&position) => self.apps[position].duration += duration,
            None => {
                self.index.insert(key.clone(), self.apps.len());
                self.apps.push(AppUsageRecord {
                    app_id: key.0,
                    display_name: key.1,
                    duration,
                });
            }
        }
    }

    fn finish(self) -> ActivityReport {
        ActivityReport {
            total_activity_duration: self.total,
            apps: self.apps,
        }
    }
}

/// Drains `batches` and reduces them to totals. Stops at the first error.
pub fn compile<I>(batches: I) -> Result<ActivityReport>
where
    I: IntoIterator<Item = Result<UsageBatch>>,
{
    let mut accumulator = Accumulator::default();
    for batch in batches {
        for segment in batch?.segments {
            for category in segment.categories {
                for app in category.apps {
                    accumulator.add(app);
                }
            }
        }
    }
    Ok(accumulator.finish())
}

/// Compiles host reports and commits them as the authoritative aggregate.
#[derive(Debug, Clone)]
pub struct ActivityReportCompiler {
    state: SharedState,
}

impl ActivityReportCompiler {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Drains the sequence, then writes app records and the aggregate.
    ///
    /// `now` is sampled by the caller after the sequence ends, so the
    /// freshness marker reflects when the data was committed.
    pub fn compile_and_commit<I>(
        &self,
        batches: I,
        now: impl FnOnce() -> DateTime<Utc>,
    ) -> Result<ActivityReport>
    where
        I: IntoIterator<Item = Result<UsageBatch>>,
    {
        let report = match compile(batches) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Report pass aborted; previous aggregate stays in force"
                );
                return Err(e);
            }
        };

        let aggregate =
            UsageAggregate::measured(report.total_activity_duration, report.app_count(), now());
        self.state.write_app_reports(&report.apps)?;
        self.state.write_aggregate(&aggregate)?;

        tracing::info!(
            duration = report.total_activity_duration,
            apps = report.app_count(),
            score = aggregate.usage_score,
            "Authoritative usage report committed"
        );
        Ok(report)
    }
}
