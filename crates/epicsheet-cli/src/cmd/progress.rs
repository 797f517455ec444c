//! `es progress` and `es complete`: per-platform completion.

use crate::cmd::Context;
use crate::output::render_success;
use crate::validate;
use clap::Args;
use epicsheet_core::model::StatusUpdate;
use epicsheet_core::workflow;

#[derive(Args, Debug)]
pub struct ProgressArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// Platform: ios, android or js.
    #[arg(long, short = 'p')]
    pub platform: String,

    /// Percent complete, 0 to 100.
    #[arg(long)]
    pub value: u32,

    /// Optional note stored with the update.
    #[arg(long, short = 'm')]
    pub comment: Option<String>,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// Platform whose development is finished.
    #[arg(long, short = 'p')]
    pub platform: String,
}

fn report(ctx: &Context, event: &StatusUpdate) -> anyhow::Result<()> {
    render_success(
        ctx.output,
        &format!("{}: {}", event.epic_id, event.message),
        serde_json::json!({ "epic_id": event.epic_id, "update": event }),
    )
}

pub fn run_progress(args: &ProgressArgs, ctx: &Context) -> anyhow::Result<()> {
    validate::validate_progress(args.value).map_err(|e| ctx.invalid(&e))?;
    let platform = ctx.platform(&args.platform)?;
    let author = ctx.author()?;
    let store = ctx.open_store()?;
    let event = workflow::record_progress(
        &store,
        &args.epic,
        platform,
        args.value,
        args.comment.as_deref(),
        &author,
    )
    .map_err(|e| ctx.fail(&e))?;
    report(ctx, &event)
}

pub fn run_complete(args: &CompleteArgs, ctx: &Context) -> anyhow::Result<()> {
    let platform = ctx.platform(&args.platform)?;
    let author = ctx.author()?;
    let store = ctx.open_store()?;
    let event = workflow::complete_platform(&store, &args.epic, platform, &author)
        .map_err(|e| ctx.fail(&e))?;
    report(ctx, &event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ProgressArgs,
    }

    #[test]
    fn progress_args_parse() {
        let w = Wrapper::parse_from(["test", "PROJ-1", "-p", "js", "--value", "40", "-m", "api done"]);
        assert_eq!(w.args.value, 40);
        assert_eq!(w.args.comment.as_deref(), Some("api done"));
    }

    #[test]
    fn negative_progress_is_a_parse_error() {
        assert!(Wrapper::try_parse_from(["test", "PROJ-1", "-p", "js", "--value", "-5"]).is_err());
    }
}
