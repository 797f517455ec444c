//! `es migrate`: bring the workbook to the current schema now instead of
//! on the first read.

use crate::cmd::Context;
use crate::output::{pretty_kv, pretty_section, render_mode};
use clap::Args;
use epicsheet_core::version::MigrationOutcome;
use std::io::Write;
use tracing::warn;

#[derive(Args, Debug, Default)]
pub struct MigrateArgs {}

pub fn run_migrate(_args: &MigrateArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let outcome = store.ensure_up_to_date().map_err(|e| ctx.fail(&e))?;
    if let MigrationOutcome::SkippedReadOnly { stored } = &outcome {
        warn!(%stored, "workbook is behind but no write credential is configured");
    }
    render_mode(ctx.output, &outcome, write_text, write_pretty)
}

fn write_text(outcome: &MigrationOutcome, w: &mut dyn Write) -> std::io::Result<()> {
    match outcome {
        MigrationOutcome::AlreadyChecked => writeln!(w, "checked"),
        MigrationOutcome::UpToDate { version } => writeln!(w, "up_to_date\t{version}"),
        MigrationOutcome::Migrated { from, to, steps } => {
            writeln!(w, "migrated\t{from}\t{to}")?;
            for step in steps {
                writeln!(
                    w,
                    "step\tepics={}\tevents={}\torphans={}\tpartitions={}",
                    step.epics_assigned,
                    step.events_moved,
                    step.orphaned_events,
                    step.partitions_created.join(",")
                )?;
            }
            Ok(())
        }
        MigrationOutcome::SkippedReadOnly { stored } => writeln!(w, "skipped_read_only\t{stored}"),
    }
}

fn write_pretty(outcome: &MigrationOutcome, w: &mut dyn Write) -> std::io::Result<()> {
    match outcome {
        MigrationOutcome::AlreadyChecked => writeln!(w, "Schema already checked."),
        MigrationOutcome::UpToDate { version } => {
            writeln!(w, "✓ Workbook is up to date (schema {version}).")
        }
        MigrationOutcome::Migrated { from, to, steps } => {
            pretty_section(w, &format!("Migrated schema {from} → {to}"))?;
            for step in steps {
                pretty_kv(w, "Epics", format!("{} assigned a quarter", step.epics_assigned))?;
                pretty_kv(w, "Events", format!("{} moved", step.events_moved))?;
                if step.orphaned_events > 0 {
                    pretty_kv(w, "Orphans", format!("{} left in the legacy log", step.orphaned_events))?;
                }
                if !step.partitions_created.is_empty() {
                    pretty_kv(w, "Created", step.partitions_created.join(", "))?;
                }
            }
            Ok(())
        }
        MigrationOutcome::SkippedReadOnly { stored } => writeln!(
            w,
            "Workbook is at schema {stored} and needs migration, but no write credential is set.\n  suggestion: set GOOGLE_SHEETS_ACCESS_TOKEN and rerun `es migrate`"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epicsheet_core::version::{RepartitionReport, SchemaVersion};

    fn text(outcome: &MigrationOutcome) -> String {
        let mut buf = Vec::new();
        write_text(outcome, &mut buf).expect("write");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn migrated_text_lists_steps() {
        let outcome = MigrationOutcome::Migrated {
            from: SchemaVersion::new(1, 0, 2),
            to: SchemaVersion::new(1, 1, 0),
            steps: vec![RepartitionReport {
                epics_assigned: 3,
                partitions_created: vec!["Status_Updates_2024_Q1".into()],
                events_moved: 8,
                legacy_cleared: true,
                orphaned_events: 1,
            }],
        };
        assert_eq!(
            text(&outcome),
            "migrated\t1.0.2\t1.1.0\nstep\tepics=3\tevents=8\torphans=1\tpartitions=Status_Updates_2024_Q1\n"
        );
    }

    #[test]
    fn read_only_skip_is_reported() {
        let outcome = MigrationOutcome::SkippedReadOnly {
            stored: SchemaVersion::new(1, 0, 2),
        };
        assert_eq!(text(&outcome), "skipped_read_only\t1.0.2\n");
    }
}
