//! `es list`: every epic with its status snapshot.

use crate::cmd::Context;
use crate::output::{pretty_section, progress_bar, render_mode};
use crate::validate;
use clap::Args;
use epicsheet_core::model::Platform;
use epicsheet_core::query::{self, EpicFilter, EpicOverview};
use std::io::Write;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only epics in this workflow state.
    #[arg(long)]
    pub status: Option<String>,

    /// Only epics with this assignee on any platform.
    #[arg(long)]
    pub assignee: Option<String>,
}

pub fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let status = args
        .status
        .as_deref()
        .map(validate::validate_state)
        .transpose()
        .map_err(|e| ctx.invalid(&e))?;
    if let Some(assignee) = &args.assignee {
        validate::validate_assignee("assignee", assignee).map_err(|e| ctx.invalid(&e))?;
    }

    let store = ctx.open_store()?;
    let data = store.fetch_all_data().map_err(|e| ctx.fail(&e))?;
    let filter = EpicFilter {
        status,
        assignee: args.assignee.clone(),
    };
    let epics = query::list_epics(&data, &filter);

    render_mode(ctx.output, &epics, write_text, write_pretty)
}

fn overall(overview: &EpicOverview) -> u8 {
    overview.status.as_ref().map_or(0, |s| s.overall_progress())
}

fn write_text(epics: &Vec<EpicOverview>, w: &mut dyn Write) -> std::io::Result<()> {
    for o in epics {
        writeln!(
            w,
            "{}\t{}\t{}%\t{}",
            o.epic.epic_id,
            o.epic.current_status,
            overall(o),
            o.epic.epic_name
        )?;
    }
    Ok(())
}

fn write_pretty(epics: &Vec<EpicOverview>, w: &mut dyn Write) -> std::io::Result<()> {
    if epics.is_empty() {
        return writeln!(w, "No epics found.");
    }
    pretty_section(w, &format!("Epics ({})", epics.len()))?;
    for o in epics {
        writeln!(
            w,
            "{:<12} {:<18} {}  {}",
            o.epic.epic_id,
            o.epic.current_status.as_str(),
            progress_bar(overall(o)),
            o.epic.epic_name
        )?;
        let assignees: Vec<String> = Platform::ALL
            .iter()
            .map(|p| format!("{} {}", p.as_str(), o.epic.assignee(*p)))
            .collect();
        writeln!(w, "{:<12} {}", "", assignees.join("  "))?;
    }
    Ok(())
}
