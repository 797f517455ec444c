//! `es init`: create the tables of a workbook that does not have them yet.

use crate::cmd::Context;
use crate::output::render_success;
use clap::Args;

#[derive(Args, Debug, Default)]
pub struct InitArgs {}

/// Create the epics, status and metadata sheets that are missing.
///
/// Safe to re-run: an initialized workbook reports nothing created.
///
/// # Errors
///
/// Fails when the workbook is read-only or the backend rejects a write.
pub fn run_init(_args: &InitArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let created = store.init_workbook().map_err(|e| ctx.fail(&e))?;
    let version = store.stored_version().map_err(|e| ctx.fail(&e))?;

    let message = if created.is_empty() {
        format!("workbook already initialized (schema {version})")
    } else {
        format!("created {} (schema {version})", created.join(", "))
    };
    render_success(
        ctx.output,
        &message,
        serde_json::json!({ "created": created, "schema_version": version }),
    )
}
