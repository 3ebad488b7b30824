//! Monitor callback handler.
//!
//! ```bash
//! holdfast-ext monitor --event interval-did-start --activity social --activity games
//! ```
//!
//! Without `--activity`, the list the main app published is used.

use chrono::Utc;
use holdfast_core::{
    open_shared_state, ActivitySource, FixedActivities, MonitorEvent, Result, StoredActivities,
    UsageAggregator,
};

use crate::Context;

pub fn run(ctx: &Context, event: &str, activities: Vec<String>) -> Result<()> {
    let event: MonitorEvent = event.parse()?;
    let state = open_shared_state(&ctx.storage, &ctx.config)?;

    let source: Box<dyn ActivitySource> = if activities.is_empty() {
        Box::new(StoredActivities::new(state.clone()))
    } else {
        Box::new(FixedActivities(activities))
    };

    UsageAggregator::new(state).handle_event(event, source.as_ref(), Utc::now())?;
    Ok(())
}
