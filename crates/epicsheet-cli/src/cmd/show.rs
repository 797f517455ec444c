//! `es show`: one epic with its snapshot and most recent updates.

use crate::cmd::Context;
use crate::output::{pretty_kv, pretty_section, progress_bar, render_mode};
use clap::Args;
use epicsheet_core::StoreError;
use epicsheet_core::model::{Platform, StatusUpdate};
use epicsheet_core::query::{self, EpicDetails};
use epicsheet_core::workflow::resolve_epic_ref;
use std::io::Write;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,
}

pub fn run_show(args: &ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let epic_id = resolve_epic_ref(&args.epic).map_err(|e| ctx.fail(&e))?;
    let store = ctx.open_store()?;
    let data = store.fetch_all_data().map_err(|e| ctx.fail(&e))?;
    let details = query::epic_details(&data, &epic_id)
        .ok_or_else(|| ctx.fail(&StoreError::WorkItemNotFound(epic_id.clone())))?;

    render_mode(ctx.output, &details, write_text, write_pretty)
}

/// One event per line, as `es show` and `es timeline` print them.
pub fn update_line(u: &StatusUpdate) -> String {
    let platform = u.platform.map_or("-", Platform::as_str);
    format!(
        "{}  {:<14} {:<8} {}  ({})",
        u.timestamp, u.kind.as_str(), platform, u.message, u.author
    )
}

fn write_text(d: &EpicDetails, w: &mut dyn Write) -> std::io::Result<()> {
    let epic = &d.overview.epic;
    writeln!(w, "{}\t{}\t{}", epic.epic_id, epic.current_status, epic.epic_name)?;
    if let Some(status) = &d.overview.status {
        for platform in Platform::ALL {
            writeln!(
                w,
                "{}\t{}\t{}%",
                platform.as_str(),
                epic.assignee(platform),
                status.progress(platform)
            )?;
        }
    }
    for u in &d.recent_updates {
        writeln!(w, "{}", update_line(u))?;
    }
    Ok(())
}

fn write_pretty(d: &EpicDetails, w: &mut dyn Write) -> std::io::Result<()> {
    let epic = &d.overview.epic;
    pretty_section(w, &format!("{}  {}", epic.epic_id, epic.epic_name))?;
    pretty_kv(w, "Status", epic.current_status.as_str())?;
    pretty_kv(w, "URL", &epic.epic_url)?;
    pretty_kv(w, "Dates", format!("{} → {}", epic.start_date, epic.target_date))?;
    if let Some(quarter) = epic.created_quarter {
        pretty_kv(w, "Quarter", quarter.label())?;
    }
    if let Some(prd) = &epic.prd_link {
        pretty_kv(w, "PRD", prd)?;
    }
    if let Some(tip) = &epic.tip_link {
        pretty_kv(w, "TIP", tip)?;
    }
    writeln!(w)?;
    for platform in Platform::ALL {
        let progress = d.overview.status.as_ref().map_or(0, |s| s.progress(platform));
        writeln!(
            w,
            "{:<11} {:<14} {}",
            platform.display_name(),
            epic.assignee(platform),
            progress_bar(progress)
        )?;
    }
    if let Some(status) = &d.overview.status {
        if !status.last_comment.is_empty() {
            writeln!(w)?;
            pretty_kv(w, "Last note", &status.last_comment)?;
            pretty_kv(w, "Updated", format!("{} by {}", status.last_updated, status.updated_by))?;
        }
    }
    if !d.recent_updates.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Recent updates")?;
        for u in &d.recent_updates {
            writeln!(w, "{}", update_line(u))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use epicsheet_core::model::UpdateKind;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ShowArgs,
    }

    #[test]
    fn epic_is_positional() {
        let w = Wrapper::parse_from(["test", "PROJ-1"]);
        assert_eq!(w.args.epic, "PROJ-1");
    }

    #[test]
    fn update_line_shows_dash_without_platform() {
        let u = StatusUpdate {
            timestamp: "2026-01-02T03:04:05.000Z".into(),
            epic_id: "PROJ-1".into(),
            kind: UpdateKind::Comment,
            platform: None,
            message: "hello".into(),
            author: "@kim".into(),
        };
        let line = update_line(&u);
        assert!(line.contains(" - "), "{line}");
        assert!(line.ends_with("hello  (@kim)"));
    }
}
