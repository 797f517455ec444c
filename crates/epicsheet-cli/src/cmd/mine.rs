//! `es mine`: epics assigned to one person, split into active and completed.

use crate::agent;
use crate::cmd::Context;
use crate::output::{CliError, pretty_section, progress_bar, render_error, render_mode};
use crate::validate;
use clap::Args;
use epicsheet_core::query::{self, AssigneeEpics, EpicOverview};
use std::io::Write;

#[derive(Args, Debug, Default)]
pub struct MineArgs {
    /// Assignee mention; defaults to the resolved author.
    #[arg(long)]
    pub assignee: Option<String>,

    /// Only epics where the assignee owns this platform.
    #[arg(long, short = 'p')]
    pub platform: Option<String>,
}

pub fn run_mine(args: &MineArgs, ctx: &Context) -> anyhow::Result<()> {
    let Some(assignee) = args
        .assignee
        .clone()
        .or_else(|| agent::resolve_author(ctx.author_flag.as_deref()))
    else {
        let msg = "no assignee given and no author could be resolved";
        render_error(
            ctx.output,
            &CliError::with_details(msg, "Pass --assignee @name or set EPICSHEET_AUTHOR", "missing_assignee"),
        )?;
        anyhow::bail!(msg);
    };
    validate::validate_assignee("assignee", &assignee).map_err(|e| ctx.invalid(&e))?;
    let platform = ctx.maybe_platform(args.platform.as_deref())?;

    let store = ctx.open_store()?;
    let data = store.fetch_all_data().map_err(|e| ctx.fail(&e))?;
    let found = query::search_by_assignee(&data, &assignee, platform);
    render_mode(ctx.output, &found, write_text, write_pretty)
}

fn line(o: &EpicOverview) -> String {
    let progress = o.status.as_ref().map_or(0, |s| s.overall_progress());
    format!(
        "{:<12} {:<18} {}  {}",
        o.epic.epic_id,
        o.epic.current_status.as_str(),
        progress_bar(progress),
        o.epic.epic_name
    )
}

fn write_text(found: &AssigneeEpics, w: &mut dyn Write) -> std::io::Result<()> {
    for (group, epics) in [("active", &found.active), ("completed", &found.completed)] {
        for o in epics {
            writeln!(w, "{group}\t{}\t{}\t{}", o.epic.epic_id, o.epic.current_status, o.epic.epic_name)?;
        }
    }
    Ok(())
}

fn write_pretty(found: &AssigneeEpics, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Active ({})", found.active.len()))?;
    for o in &found.active {
        writeln!(w, "{}", line(o))?;
    }
    writeln!(w)?;
    pretty_section(w, &format!("Completed ({})", found.completed.len()))?;
    for o in &found.completed {
        writeln!(w, "{}", line(o))?;
    }
    Ok(())
}
