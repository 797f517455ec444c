//! `es timeline`: an epic's event history, newest first.

use crate::cmd::Context;
use crate::cmd::show::update_line;
use crate::output::{pretty_section, render};
use clap::Args;
use epicsheet_core::model::{StatusUpdate, sort_newest_first};
use epicsheet_core::query::DEFAULT_TIMELINE_LIMIT;
use epicsheet_core::workflow::resolve_epic_ref;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct TimelineArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// Maximum events to show.
    #[arg(short = 'n', long, default_value_t = DEFAULT_TIMELINE_LIMIT)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
struct TimelineOutput {
    epic_id: String,
    total: usize,
    updates: Vec<StatusUpdate>,
}

/// Read the history straight from the epic's partition, bypassing the
/// snapshot cache.
pub fn run_timeline(args: &TimelineArgs, ctx: &Context) -> anyhow::Result<()> {
    let epic_id = resolve_epic_ref(&args.epic).map_err(|e| ctx.fail(&e))?;
    let store = ctx.open_store()?;
    let mut updates = store.fetch_event_history(&epic_id).map_err(|e| ctx.fail(&e))?;
    let total = updates.len();
    sort_newest_first(&mut updates);
    updates.truncate(args.limit);

    let out = TimelineOutput {
        epic_id,
        total,
        updates,
    };
    render(ctx.output, &out, |out, w| {
        pretty_section(w, &format!("{} ({} of {})", out.epic_id, out.updates.len(), out.total))?;
        if out.updates.is_empty() {
            writeln!(w, "No updates recorded.")?;
        }
        for u in &out.updates {
            writeln!(w, "{}", update_line(u))?;
        }
        Ok(())
    })
}
