//! 1.0 → 1.1: repartition the status-update log by creation quarter.
//!
//! Every step can be re-run after a partial failure:
//!
//! 1. Add the `created_quarter` header to the epics sheet if missing.
//! 2. Estimate and persist a quarter for each epic that has none, one cell
//!    write per epic.
//! 3. Create the quarterly partitions that do not exist yet.
//! 4. Only if step 3 created at least one partition, copy the legacy log
//!    into the partitions in bounded batches.
//! 5. Only after step 4 ran, clear the legacy log's data rows.
//!
//! Gating 4 and 5 on newly created partitions is what keeps a re-run from
//! copying events twice. Legacy events whose epic is unknown are kept in the
//! legacy log instead of being dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{Epic, StatusUpdate};
use crate::quarter::{Quarter, parse_date, partition_name};
use crate::sheet::{SheetRow, range};
use crate::version::MigrationContext;

const CREATED_QUARTER: &str = "created_quarter";

/// What one run of the repartition step did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepartitionReport {
    /// Epics that received a quarter in this run.
    pub epics_assigned: usize,
    pub partitions_created: Vec<String>,
    pub events_moved: usize,
    pub legacy_cleared: bool,
    /// Legacy events left behind because their epic does not exist.
    pub orphaned_events: usize,
}

/// Quarter for an epic that has none: its start date, else its earliest
/// event, else `current`. Event times are bucketed by their local date, the
/// same clock `current_quarter` reads.
#[must_use]
pub fn estimate_quarter(epic: &Epic, legacy: &[StatusUpdate], current: Quarter) -> Quarter {
    if !epic.start_date.trim().is_empty() {
        match parse_date(&epic.start_date) {
            Ok(date) => return Quarter::from_date(date),
            Err(_) => {
                warn!(epic_id = %epic.epic_id, start_date = %epic.start_date, "unparseable start_date");
            }
        }
    }
    legacy
        .iter()
        .filter(|u| u.epic_id == epic.epic_id)
        .filter_map(StatusUpdate::parsed_timestamp)
        .min()
        .map_or(current, |ts| Quarter::from_date(ts.with_timezone(&Local).date_naive()))
}

/// Run the repartition step.
///
/// # Errors
///
/// Any read or write failure aborts the step; completed cell writes and
/// created partitions stay in place for the retry.
pub fn run(ctx: &MigrationContext<'_>) -> Result<RepartitionReport, StoreError> {
    let sheets = &ctx.config.sheets;
    let mut report = RepartitionReport::default();

    // 1. created_quarter column
    let header = ctx
        .table
        .fetch_table(&sheets.epics)?
        .into_iter()
        .next()
        .unwrap_or_default();
    let column = match header.iter().position(|h| h.trim() == CREATED_QUARTER) {
        Some(col) => col,
        None => {
            let col = Epic::column(CREATED_QUARTER).unwrap_or(Epic::COLUMNS.len() - 1);
            info!(sheet = %sheets.epics, column = %range::column_letter(col), "adding created_quarter column");
            ctx.table.write_range(
                &range::cell(&sheets.epics, col, 1),
                &[vec![CREATED_QUARTER.to_string()]],
            )?;
            col
        }
    };

    // 2. assign quarters
    let epics = ctx.table.fetch_rows::<Epic>(&sheets.epics)?;
    let legacy = match ctx.table.fetch_records::<StatusUpdate>(&sheets.legacy_updates) {
        Ok(rows) => rows,
        Err(StoreError::NotFound { .. }) => {
            debug!(sheet = %sheets.legacy_updates, "no legacy log");
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    let mut assignments: HashMap<String, Quarter> = HashMap::new();
    for (row, epic) in &epics {
        if epic.epic_id.is_empty() {
            continue;
        }
        let quarter = match epic.created_quarter {
            Some(quarter) => quarter,
            None => {
                let quarter = estimate_quarter(epic, &legacy, ctx.current);
                ctx.table.write_range(
                    &range::cell(&sheets.epics, column, *row),
                    &[vec![quarter.label()]],
                )?;
                debug!(epic_id = %epic.epic_id, quarter = %quarter, "assigned quarter");
                report.epics_assigned += 1;
                quarter
            }
        };
        assignments.insert(epic.epic_id.clone(), quarter);
    }
    info!(assigned = report.epics_assigned, epics = epics.len(), "quarters assigned");

    // 3. partitions
    let quarters: BTreeSet<Quarter> = assignments.values().copied().collect();
    for quarter in &quarters {
        let sheet = partition_name(&sheets.partition_prefix, Some(*quarter));
        if ctx.table.partition_exists(&sheet)? {
            debug!(sheet = %sheet, "partition already exists");
        } else if ctx.table.create_partition(&sheet)? {
            report.partitions_created.push(sheet);
        }
    }

    // 4. move events
    if report.partitions_created.is_empty() {
        info!("all quarterly partitions already exist, skipping event migration");
        return Ok(report);
    }

    let mut groups: BTreeMap<Quarter, Vec<&StatusUpdate>> = BTreeMap::new();
    let mut orphans = Vec::new();
    for update in &legacy {
        match assignments.get(&update.epic_id) {
            Some(quarter) => groups.entry(*quarter).or_default().push(update),
            None => orphans.push(update),
        }
    }

    let mut targets: BTreeSet<String> = report.partitions_created.iter().cloned().collect();
    targets.extend(
        groups
            .keys()
            .map(|q| partition_name(&sheets.partition_prefix, Some(*q))),
    );
    for sheet in &targets {
        ctx.table.write_header::<StatusUpdate>(sheet)?;
    }

    let batch_size = ctx.config.migration.batch_size.max(1);
    let width = StatusUpdate::COLUMNS.len();
    for (quarter, updates) in &groups {
        let sheet = partition_name(&sheets.partition_prefix, Some(*quarter));
        let batches: Vec<_> = updates.chunks(batch_size).collect();
        info!(sheet = %sheet, events = updates.len(), batches = batches.len(), "moving events");
        for (i, batch) in batches.iter().enumerate() {
            if i > 0 {
                std::thread::sleep(ctx.config.migration.batch_pause());
            }
            let rows: Vec<Vec<String>> = batch.iter().map(|u| u.to_row()).collect();
            ctx.table.append_rows(&sheet, width, &rows)?;
            report.events_moved += rows.len();
        }
    }

    // 5. clear legacy
    report.orphaned_events = orphans.len();
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "legacy events reference unknown epics, keeping them in the legacy log");
    }
    let raw = match ctx.table.fetch_table(&sheets.legacy_updates) {
        Ok(raw) => raw,
        Err(StoreError::NotFound { .. }) => return Ok(report),
        Err(err) => return Err(err),
    };
    let data_rows = raw.len().saturating_sub(1);
    if data_rows > 0 {
        let width = raw.iter().map(Vec::len).max().unwrap_or(0).max(width);
        let mut block: Vec<Vec<String>> = orphans
            .iter()
            .map(|u| {
                let mut row = u.to_row();
                row.resize(width, String::new());
                row
            })
            .collect();
        block.resize(data_rows.max(block.len()), vec![String::new(); width]);
        ctx.table.write_range(
            &range::box_range(&sheets.legacy_updates, 2, block.len() + 1, width),
            &block,
        )?;
    }
    report.legacy_cleared = true;
    info!(
        moved = report.events_moved,
        partitions = report.partitions_created.len(),
        "legacy log cleared"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpicState, NewStatusUpdate, UpdateKind};

    fn epic(id: &str, start: &str) -> Epic {
        Epic {
            epic_id: id.into(),
            epic_name: id.into(),
            epic_url: String::new(),
            current_status: EpicState::Development,
            ios_assignee: String::new(),
            android_assignee: String::new(),
            js_assignee: String::new(),
            start_date: start.into(),
            target_date: String::new(),
            prd_link: None,
            tip_link: None,
            created_quarter: None,
        }
    }

    fn event(id: &str, ts: &str) -> StatusUpdate {
        NewStatusUpdate::new(id, UpdateKind::Comment, "m", "@a").at(ts.to_string())
    }

    fn q(label: &str) -> Quarter {
        label.parse().expect("quarter")
    }

    #[test]
    fn start_date_wins() {
        let legacy = [event("A-1", "2023-01-01T00:00:00Z")];
        assert_eq!(
            estimate_quarter(&epic("A-1", "2024-05-02"), &legacy, q("2026_Q1")),
            q("2024_Q2")
        );
    }

    #[test]
    fn earliest_event_used_when_start_date_unusable() {
        let legacy = [
            event("A-1", "2024-08-01T00:00:00Z"),
            event("A-1", "2024-02-10T00:00:00Z"),
            event("B-2", "2020-01-01T00:00:00Z"),
            event("A-1", "not a time"),
        ];
        assert_eq!(
            estimate_quarter(&epic("A-1", "someday"), &legacy, q("2026_Q1")),
            q("2024_Q1")
        );
        assert_eq!(
            estimate_quarter(&epic("A-1", ""), &legacy, q("2026_Q1")),
            q("2024_Q1")
        );
    }

    #[test]
    fn earliest_event_is_bucketed_by_local_date() {
        let legacy = [event("D-4", "2024-03-31T23:30:00Z")];
        let local_day = legacy[0]
            .parsed_timestamp()
            .expect("timestamp")
            .with_timezone(&Local)
            .date_naive();
        assert_eq!(
            estimate_quarter(&epic("D-4", ""), &legacy, q("2026_Q1")),
            Quarter::from_date(local_day)
        );
    }

    #[test]
    fn falls_back_to_current_quarter() {
        assert_eq!(
            estimate_quarter(&epic("C-3", ""), &[], q("2026_Q1")),
            q("2026_Q1")
        );
    }
}
