//! # holdfast-core
//!
//! Shared screen-time and reward state for Holdfast's cooperating processes:
//! the main app, the activity monitor, the activity reporter, and the shield
//! action handler. None of them can call each other; everything they agree on
//! lives in a per-app-group key-value store.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Host hooks are short-lived.
//! - **Locked read-modify-write**: Counters, the pending reward queue, and the
//!   unblock request are only mutated under the app group's cross-process lock.
//! - **Graceful degradation**: Missing or corrupt values read as absent; an
//!   unreachable store reads as "no data yet".
//! - **Last writer wins**: Estimates and authoritative reports overwrite the
//!   same aggregate; readers judge it by freshness alone.
//! - **FFI-ready**: UniFFI annotations enable Swift and Kotlin bindings for the
//!   main app.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use holdfast_core::WellbeingEngine;
//!
//! let engine = WellbeingEngine::new();
//! let snapshot = engine.usage_snapshot();
//! let summary = engine.apply_pending_rewards()?;
//! ```

// UniFFI scaffolding for Swift/Kotlin bindings
uniffi::setup_scaffolding!();

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod ledger;
pub mod model;
pub mod report;
pub mod router;
pub mod storage;
pub mod store;

pub use aggregator::{
    publish_monitored_activities, ActivitySource, Estimate, FixedActivities, MonitorEvent,
    StoredActivities, UsageAggregator,
};
pub use config::*;
pub use engine::WellbeingEngine;
pub use error::{HoldfastError, HoldfastFfiError, Result};
pub use freshness::*;
pub use ledger::{draw_reward, reward_range, DrainSummary, RewardLedger};
pub use model::*;
pub use report::{
    batches_from_reader, ActivityReport, ActivityReportCompiler, AppActivity, CategoryUsage,
    UsageBatch, UsageSegment,
};
pub use router::{
    pending_unblock_request, request_unblock_prompt, DecisionOutcome, DecisionRouter,
    LegacySignal, NotificationRequest, NotificationScheduler, ShieldAction, ShieldDecision,
    ShieldScope,
};
pub use storage::*;
pub use store::{open_shared_state, KeyValueStore, SharedState};
