//! Main-app commands: reward drain and status.

use holdfast_core::{
    open_shared_state, pending_unblock_request, Result, RewardLedger, UsageSnapshot,
    WellbeingEngine,
};
use serde::Serialize;

use crate::Context;

#[derive(Debug, Serialize)]
struct Status {
    status: &'static str,
    total_minutes: u32,
    app_count: u32,
    usage_score: u8,
    age_secs: Option<u64>,
    updated_at: Option<String>,
    gem_balance: u64,
    pending_unblock_app: Option<String>,
}

impl Status {
    fn new(snapshot: UsageSnapshot, gem_balance: u64, pending_unblock_app: Option<String>) -> Self {
        use holdfast_core::UsageStatus;
        Self {
            status: match snapshot.status {
                UsageStatus::NoData => "no-data",
                UsageStatus::Stale => "stale",
                UsageStatus::Fresh => "fresh",
            },
            total_minutes: snapshot.total_minutes,
            app_count: snapshot.app_count,
            usage_score: snapshot.usage_score,
            age_secs: snapshot.age_secs,
            updated_at: snapshot.updated_at,
            gem_balance,
            pending_unblock_app,
        }
    }
}

fn engine(ctx: &Context) -> WellbeingEngine {
    WellbeingEngine::with_config(ctx.storage.clone(), ctx.config.clone())
}

pub fn drain(ctx: &Context) -> Result<()> {
    let state = open_shared_state(&ctx.storage, &ctx.config)?;
    let summary = RewardLedger::new(state, &ctx.config).apply_pending_to_balance()?;
    print_json(&summary)
}

pub fn status(ctx: &Context) -> Result<()> {
    let engine = engine(ctx);
    let pending_unblock_app = match engine.shared_state() {
        Some(state) => pending_unblock_request(&state)?,
        None => None,
    };
    let status = Status::new(
        engine.usage_snapshot(),
        engine.gem_balance(),
        pending_unblock_app,
    );
    print_json(&status)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| holdfast_core::HoldfastError::json("serializing command output", e))?;
    println!("{}", line);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_core::{load_config, StorageConfig, UsageStatus};

    #[test]
    fn test_status_labels() {
        let status = Status::new(UsageSnapshot::no_data(), 40, None);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "no-data");
        assert_eq!(json["gem_balance"], 40);

        let mut snapshot = UsageSnapshot::no_data();
        snapshot.status = UsageStatus::Stale;
        assert_eq!(Status::new(snapshot, 0, None).status, "stale");
    }

    #[test]
    fn test_drain_on_fresh_store_succeeds() {
        let temp = tempfile::tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        let config = load_config(&storage);
        assert!(drain(&Context { storage, config }).is_ok());
    }
}
