//! `es blockers`, `es block` and `es resolve`: the blocker lifecycle.
//!
//! A blocker stays open until a resolution is logged for the same epic and
//! platform with a later timestamp.

use crate::cmd::Context;
use crate::cmd::show::update_line;
use crate::output::{pretty_section, render, render_success};
use clap::Args;
use epicsheet_core::query::{self, EpicBlockers};
use epicsheet_core::workflow;
use std::io::Write;

#[derive(Args, Debug, Default)]
pub struct BlockersArgs {}

#[derive(Args, Debug)]
pub struct BlockArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// Blocked platform: ios, android or js.
    #[arg(long, short = 'p')]
    pub platform: String,

    /// What is blocking progress.
    pub description: String,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// Platform whose blocker is resolved.
    #[arg(long, short = 'p')]
    pub platform: String,

    /// How the blocker was resolved.
    pub resolution: String,
}

pub fn run_blockers(_args: &BlockersArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let data = store.fetch_all_data().map_err(|e| ctx.fail(&e))?;
    let open = query::unresolved_blockers(&data);
    render(ctx.output, &open, |open: &Vec<EpicBlockers>, w| {
        if open.is_empty() {
            return writeln!(w, "No open blockers.");
        }
        for epic in open {
            pretty_section(w, &format!("{}  {}", epic.epic_id, epic.epic_name))?;
            for b in &epic.blockers {
                writeln!(w, "{}", update_line(b))?;
            }
            writeln!(w)?;
        }
        Ok(())
    })
}

pub fn run_block(args: &BlockArgs, ctx: &Context) -> anyhow::Result<()> {
    let platform = ctx.platform(&args.platform)?;
    let author = ctx.author()?;
    let store = ctx.open_store()?;
    let event = workflow::report_blocker(&store, &args.epic, platform, &args.description, &author)
        .map_err(|e| ctx.fail(&e))?;
    render_success(
        ctx.output,
        &format!("{} blocked on {platform}: {}", event.epic_id, args.description),
        serde_json::json!({ "epic_id": event.epic_id, "update": event }),
    )
}

pub fn run_resolve(args: &ResolveArgs, ctx: &Context) -> anyhow::Result<()> {
    let platform = ctx.platform(&args.platform)?;
    let author = ctx.author()?;
    let store = ctx.open_store()?;
    let event = workflow::resolve_blocker(&store, &args.epic, platform, &args.resolution, &author)
        .map_err(|e| ctx.fail(&e))?;
    render_success(
        ctx.output,
        &format!("{} unblocked on {platform}: {}", event.epic_id, args.resolution),
        serde_json::json!({ "epic_id": event.epic_id, "update": event }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct BlockWrapper {
        #[command(flatten)]
        args: BlockArgs,
    }

    #[test]
    fn block_takes_platform_and_description() {
        let w = BlockWrapper::parse_from(["test", "PROJ-1", "-p", "ios", "cert expired"]);
        assert_eq!(w.args.epic, "PROJ-1");
        assert_eq!(w.args.platform, "ios");
        assert_eq!(w.args.description, "cert expired");
    }

    #[test]
    fn block_requires_platform() {
        assert!(BlockWrapper::try_parse_from(["test", "PROJ-1", "cert expired"]).is_err());
    }
}
