//! `es create`: register a new epic.

use crate::cmd::Context;
use crate::output::{CliError, render_error, render_success};
use crate::validate::{self, EpicInput};
use clap::Args;
use epicsheet_core::model::NewEpic;
use tracing::debug;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Epic name.
    #[arg(long)]
    pub name: String,

    /// Tracker URL ending in /browse/PROJ-123; the id is taken from it.
    #[arg(long)]
    pub url: String,

    /// iOS assignee mention.
    #[arg(long)]
    pub ios: String,

    /// Android assignee mention.
    #[arg(long)]
    pub android: String,

    /// JS assignee mention.
    #[arg(long)]
    pub js: String,

    /// Start date, YYYY-MM-DD.
    #[arg(long)]
    pub start: String,

    /// Target date, YYYY-MM-DD.
    #[arg(long)]
    pub target: String,

    /// Product requirements document link.
    #[arg(long)]
    pub prd: Option<String>,

    /// Technical implementation plan link.
    #[arg(long)]
    pub tip: Option<String>,

    /// Initial workflow state (default: backlog).
    #[arg(long)]
    pub status: Option<String>,
}

/// Validate every field up front and report all problems at once.
pub fn run_create(args: &CreateArgs, ctx: &Context) -> anyhow::Result<()> {
    let input = EpicInput {
        name: &args.name,
        url: &args.url,
        ios: &args.ios,
        android: &args.android,
        js: &args.js,
        start: &args.start,
        target: &args.target,
    };
    let errors = validate::validate_new_epic(&input);
    if let Some(first) = errors.first() {
        if errors.len() == 1 {
            return Err(ctx.invalid(first));
        }
        let summary: Vec<String> = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect();
        let msg = format!("{} invalid fields: {}", errors.len(), summary.join("; "));
        render_error(
            ctx.output,
            &CliError::with_details(&msg, "Fix the listed fields and retry", "invalid_epic"),
        )?;
        anyhow::bail!(msg);
    }
    let initial_status = args
        .status
        .as_deref()
        .map(validate::validate_state)
        .transpose()
        .map_err(|e| ctx.invalid(&e))?;
    let author = ctx.author()?;

    let new = NewEpic {
        epic_name: args.name.trim().to_string(),
        epic_url: args.url.trim().to_string(),
        ios_assignee: args.ios.clone(),
        android_assignee: args.android.clone(),
        js_assignee: args.js.clone(),
        start_date: args.start.clone(),
        target_date: args.target.clone(),
        prd_link: args.prd.clone().filter(|l| !l.trim().is_empty()),
        tip_link: args.tip.clone().filter(|l| !l.trim().is_empty()),
        initial_status,
        author,
    };
    debug!(url = %new.epic_url, "creating epic");

    let store = ctx.open_store()?;
    let epic_id = store.create_work_item(&new).map_err(|e| ctx.fail(&e))?;
    let state = initial_status.unwrap_or_default();
    render_success(
        ctx.output,
        &format!("created {epic_id}: {} ({state})", new.epic_name),
        serde_json::json!({ "epic_id": epic_id, "status": state }),
    )
}
