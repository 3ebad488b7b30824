//! Report pass: NDJSON usage batches on stdin, one authoritative write.
//!
//! ```bash
//! host-dump-usage | holdfast-ext report
//! ```

use chrono::Utc;
use holdfast_core::{
    batches_from_reader, open_shared_state, ActivityReportCompiler, HoldfastError, Result,
    UsageBatch,
};
use std::io;

use crate::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let stdin = io::stdin();
    run_with(ctx, batches_from_reader(stdin.lock()))
}

fn run_with<I>(ctx: &Context, batches: I) -> Result<()>
where
    I: IntoIterator<Item = Result<UsageBatch>>,
{
    let state = open_shared_state(&ctx.storage, &ctx.config)?;
    match ActivityReportCompiler::new(state).compile_and_commit(batches, Utc::now) {
        Ok(_) => Ok(()),
        // Nothing was written; the previous aggregate stays in force.
        Err(HoldfastError::ReportStream(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
