//! `es comment`: free-form note on an epic.

use crate::cmd::Context;
use crate::output::{CliError, render_error, render_success};
use clap::Args;
use epicsheet_core::workflow;

const MAX_COMMENT_CHARS: usize = 4_096;

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Epic id (PROJ-123) or tracker URL.
    pub epic: String,

    /// Comment text.
    pub text: String,

    /// Platform the note is about, if any.
    #[arg(long, short = 'p')]
    pub platform: Option<String>,
}

fn validate_comment(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("comment must not be empty".to_string());
    }
    let chars = text.chars().count();
    if chars > MAX_COMMENT_CHARS {
        return Err(format!("comment must be <= {MAX_COMMENT_CHARS} characters (got {chars})"));
    }
    Ok(())
}

pub fn run_comment(args: &CommentArgs, ctx: &Context) -> anyhow::Result<()> {
    if let Err(msg) = validate_comment(&args.text) {
        render_error(
            ctx.output,
            &CliError::with_details(&msg, "Pass a short non-empty note", "invalid_comment"),
        )?;
        anyhow::bail!(msg);
    }
    let platform = ctx.maybe_platform(args.platform.as_deref())?;
    let author = ctx.author()?;
    let store = ctx.open_store()?;
    let event = workflow::add_comment(&store, &args.epic, args.text.trim(), platform, &author)
        .map_err(|e| ctx.fail(&e))?;
    render_success(
        ctx.output,
        &format!("commented on {}", event.epic_id),
        serde_json::json!({ "epic_id": event.epic_id, "update": event }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_comment_is_rejected() {
        assert!(validate_comment("  \n").is_err());
        assert!(validate_comment("ok").is_ok());
    }

    #[test]
    fn oversized_comment_is_rejected() {
        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(validate_comment(&long).is_err());
    }
}
