//! Shield decision handlers.
//!
//! ```bash
//! holdfast-ext decide --action change-mind --scope app --name Video
//! holdfast-ext decide-legacy --app-name Video --marker unblock_decision
//! ```
//!
//! Notification requests go to stdout as JSON lines.

use chrono::Utc;
use holdfast_core::{
    open_shared_state, DecisionOutcome, DecisionRouter, LegacySignal, NotificationScheduler,
    Result, ShieldAction, ShieldDecision, ShieldScope,
};

use crate::notify::JsonLinesScheduler;
use crate::Context;

pub fn run(ctx: &Context, action: ShieldAction, scope: ShieldScope) -> Result<()> {
    run_with(ctx, ShieldDecision { action, scope }, JsonLinesScheduler::stdout()).map(|_| ())
}

pub fn run_legacy(ctx: &Context, app_name: String, marker: String) -> Result<()> {
    let state = open_shared_state(&ctx.storage, &ctx.config)?;
    let router = DecisionRouter::new(state, &ctx.config, JsonLinesScheduler::stdout());
    let outcome = router.handle_legacy(&LegacySignal { app_name, marker })?;
    tracing::debug!(outcome = ?outcome, "Legacy shield signal handled");
    Ok(())
}

fn run_with<N: NotificationScheduler>(
    ctx: &Context,
    decision: ShieldDecision,
    notifier: N,
) -> Result<DecisionOutcome> {
    let state = open_shared_state(&ctx.storage, &ctx.config)?;
    let router = DecisionRouter::new(state, &ctx.config, notifier);
    router.handle(&decision, Utc::now(), &mut rand::thread_rng())
}
