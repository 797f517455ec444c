//! `es schema-version`: stored versus expected schema.

use crate::cmd::Context;
use crate::output::{pretty_kv, render_mode};
use clap::Args;
use epicsheet_core::version::{Phase, SchemaVersion, TARGET_VERSION};
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug, Default)]
pub struct SchemaVersionArgs {}

#[derive(Debug, Serialize)]
struct SchemaReport {
    stored: SchemaVersion,
    target: SchemaVersion,
    needs_migration: bool,
    writable: bool,
    phase: Phase,
}

/// Report without migrating.
pub fn run_schema_version(_args: &SchemaVersionArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stored = store.stored_version().map_err(|e| ctx.fail(&e))?;
    let report = SchemaReport {
        stored,
        target: TARGET_VERSION,
        needs_migration: stored.needs_migration(TARGET_VERSION),
        writable: store.is_writable(),
        phase: store.migration_state().phase(),
    };
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}\t{}\t{}", r.stored, r.target, r.needs_migration),
        |r, w| {
            pretty_kv(w, "Stored", r.stored.to_string())?;
            pretty_kv(w, "Target", r.target.to_string())?;
            let state = match (r.needs_migration, r.writable) {
                (false, _) => "up to date",
                (true, true) => "migration pending; runs on next access or `es migrate`",
                (true, false) => "migration pending; needs a write credential",
            };
            pretty_kv(w, "State", state)
        },
    )
}
