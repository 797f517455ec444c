//! `es status`: move an epic to another workflow state.

use crate::cmd::Context;
use crate::output::render_success;
use crate::validate;
use clap::Args;
use epicsheet_core::workflow;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// New state, e.g. development, code_review, testing, done.
    pub state: String,

    /// Why the state changed.
    #[arg(long, short = 'r')]
    pub reason: Option<String>,
}

pub fn run_status(args: &StatusArgs, ctx: &Context) -> anyhow::Result<()> {
    let state = validate::validate_state(&args.state).map_err(|e| ctx.invalid(&e))?;
    let author = ctx.author()?;
    let store = ctx.open_store()?;
    let event = workflow::change_status(&store, &args.epic, state, args.reason.as_deref(), &author)
        .map_err(|e| ctx.fail(&e))?;
    render_success(
        ctx.output,
        &format!("{}: {}", event.epic_id, event.message),
        serde_json::json!({ "epic_id": event.epic_id, "status": state, "update": event }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: StatusArgs,
    }

    #[test]
    fn reason_is_optional() {
        let w = Wrapper::parse_from(["test", "PROJ-1", "testing"]);
        assert_eq!(w.args.state, "testing");
        assert!(w.args.reason.is_none());
    }
}
