//! `es team`: portfolio roll-up across active epics.

use crate::cmd::Context;
use crate::cmd::show::update_line;
use crate::output::{pretty_kv, pretty_section, progress_bar, render_mode};
use clap::Args;
use epicsheet_core::model::Platform;
use epicsheet_core::query::{self, TeamProgress};
use std::io::Write;

#[derive(Args, Debug, Default)]
pub struct TeamArgs {}

pub fn run_team(_args: &TeamArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let data = store.fetch_all_data().map_err(|e| ctx.fail(&e))?;
    let progress = query::team_progress(&data);
    render_mode(ctx.output, &progress, write_text, write_pretty)
}

fn write_text(t: &TeamProgress, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "active\t{}", t.active_epics)?;
    for (state, count) in &t.by_status {
        writeln!(w, "status\t{state}\t{count}")?;
    }
    for platform in Platform::ALL {
        writeln!(w, "avg\t{}\t{}%", platform.as_str(), t.average_progress.get(platform))?;
    }
    writeln!(w, "blockers\t{}", t.open_blockers.len())
}

fn write_pretty(t: &TeamProgress, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Team progress")?;
    pretty_kv(w, "Active", t.active_epics.to_string())?;
    for (state, count) in &t.by_status {
        pretty_kv(w, state.as_str(), count.to_string())?;
    }
    writeln!(w)?;
    for platform in Platform::ALL {
        writeln!(
            w,
            "{:<11} {}",
            platform.display_name(),
            progress_bar(t.average_progress.get(platform))
        )?;
    }
    if !t.open_blockers.is_empty() {
        writeln!(w)?;
        pretty_section(w, &format!("Open blockers ({})", t.open_blockers.len()))?;
        for b in &t.open_blockers {
            writeln!(w, "{}  {}", b.epic_id, update_line(b))?;
        }
    }
    Ok(())
}
