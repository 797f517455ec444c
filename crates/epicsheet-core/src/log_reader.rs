//! Partitioned log reader.
//!
//! Builds one logical event stream from the quarterly partitions that can
//! still matter plus the legacy unpartitioned log. Partitions are chosen by
//! the `created_quarter` of incomplete epics, which bounds the read fan-out
//! as quarters accumulate. Missing or failing partitions are skipped: a
//! partial log is preferred over no log.
//!
//! The reader never mutates and never deduplicates; overlapping rows simply
//! appear twice. See [`StatusUpdate::dedup_key`] for consumers that care.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::SheetNames;
use crate::error::StoreError;
use crate::model::{Epic, StatusUpdate};
use crate::quarter::{Quarter, partition_name};
use crate::table::TableStore;

pub struct PartitionedLogReader<'a> {
    table: &'a TableStore,
    sheets: &'a SheetNames,
    current: Quarter,
}

impl<'a> PartitionedLogReader<'a> {
    #[must_use]
    pub const fn new(table: &'a TableStore, sheets: &'a SheetNames, current: Quarter) -> Self {
        Self {
            table,
            sheets,
            current,
        }
    }

    /// Partitions to read for `epics`, in chronological order, current
    /// quarter included.
    #[must_use]
    pub fn partitions_for(&self, epics: &[Epic]) -> Vec<Quarter> {
        let mut quarters: BTreeSet<Quarter> = epics
            .iter()
            .filter(|epic| !epic.current_status.is_complete())
            .filter_map(|epic| epic.created_quarter)
            .collect();
        quarters.insert(self.current);
        quarters.into_iter().collect()
    }

    /// Merged event log for `epics`. Never fails.
    #[must_use]
    pub fn fetch_event_log(&self, epics: &[Epic]) -> Vec<StatusUpdate> {
        let mut events = Vec::new();
        for quarter in self.partitions_for(epics) {
            let sheet = partition_name(&self.sheets.partition_prefix, Some(quarter));
            self.read_into(&sheet, &mut events);
        }
        self.read_into(&self.sheets.legacy_updates, &mut events);
        events
    }

    fn read_into(&self, sheet: &str, events: &mut Vec<StatusUpdate>) {
        match self.table.fetch_records::<StatusUpdate>(sheet) {
            Ok(rows) => {
                debug!(sheet, rows = rows.len(), "read event partition");
                events.extend(rows);
            }
            Err(StoreError::NotFound { .. }) => {
                debug!(sheet, "event partition does not exist, skipping");
            }
            Err(err) => {
                warn!(sheet, error = %err, "failed to read event partition, skipping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::memory::{MemoryBackend, Op};
    use crate::backend::SheetBackend;
    use crate::cache::SnapshotCache;
    use crate::model::EpicState;
    use crate::sheet::SheetRow;
    use std::sync::Arc;
    use std::time::Duration;

    fn epic(id: &str, state: EpicState, quarter: Option<&str>) -> Epic {
        Epic {
            epic_id: id.into(),
            epic_name: id.into(),
            epic_url: format!("https://x/browse/{id}"),
            current_status: state,
            ios_assignee: String::new(),
            android_assignee: String::new(),
            js_assignee: String::new(),
            start_date: String::new(),
            target_date: String::new(),
            prd_link: None,
            tip_link: None,
            created_quarter: quarter.map(|q| q.parse().expect("quarter")),
        }
    }

    fn log_row<'a>(ts: &'a str, id: &'a str, msg: &'a str) -> [&'a str; 6] {
        [ts, id, "comment", "", msg, "@kim"]
    }

    fn table(backend: MemoryBackend) -> (Arc<MemoryBackend>, TableStore) {
        let backend = Arc::new(backend);
        let dyn_backend: Arc<dyn SheetBackend> = backend.clone();
        let table = TableStore::new(dyn_backend, Arc::new(SnapshotCache::new(Duration::ZERO)));
        (backend, table)
    }

    #[test]
    fn reads_incomplete_quarters_current_and_legacy() {
        let (backend, table) = table(
            MemoryBackend::new()
                .with_sheet(
                    "Status_Updates_2024_Q4",
                    &[StatusUpdate::COLUMNS, &log_row("2024-11-01T00:00:00Z", "A-1", "q4")],
                )
                .with_sheet(
                    "Status_Updates_2025_Q1",
                    &[StatusUpdate::COLUMNS, &log_row("2025-02-01T00:00:00Z", "C-3", "now")],
                )
                .with_sheet(
                    "Status_Updates_2023_Q1",
                    &[StatusUpdate::COLUMNS, &log_row("2023-02-01T00:00:00Z", "B-2", "done")],
                )
                .with_sheet(
                    "Status_Updates",
                    &[StatusUpdate::COLUMNS, &log_row("2022-01-01T00:00:00Z", "Z-9", "legacy")],
                ),
        );
        let sheets = SheetNames::default();
        let current = Quarter::new(2025, 1).expect("quarter");
        let reader = PartitionedLogReader::new(&table, &sheets, current);
        let epics = [
            epic("A-1", EpicState::Development, Some("2024_Q4")),
            epic("B-2", EpicState::Done, Some("2023_Q1")),
            epic("D-4", EpicState::Testing, None),
        ];

        let messages: Vec<_> = reader
            .fetch_event_log(&epics)
            .into_iter()
            .map(|u| u.message)
            .collect();
        assert_eq!(messages, ["q4", "now", "legacy"]);
        assert_eq!(backend.calls(Op::Read), 3);
    }

    #[test]
    fn missing_and_failing_partitions_are_skipped() {
        let (backend, table) = table(
            MemoryBackend::new()
                .with_sheet(
                    "Status_Updates_2024_Q3",
                    &[StatusUpdate::COLUMNS, &log_row("2024-08-01T00:00:00Z", "A-1", "lost")],
                )
                .with_sheet(
                    "Status_Updates",
                    &[StatusUpdate::COLUMNS, &log_row("2022-01-01T00:00:00Z", "Z-9", "legacy")],
                ),
        );
        backend.fail_next(
            Op::Read,
            "Status_Updates_2024_Q3",
            BackendError::Transport("timeout".into()),
        );
        let sheets = SheetNames::default();
        let reader =
            PartitionedLogReader::new(&table, &sheets, Quarter::new(2025, 1).expect("quarter"));
        let epics = [epic("A-1", EpicState::Development, Some("2024_Q3"))];

        let events = reader.fetch_event_log(&epics);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "legacy");
    }

    #[test]
    fn overlapping_rows_appear_twice() {
        let row = log_row("2025-01-05T00:00:00Z", "A-1", "dup");
        let (_backend, table) = table(
            MemoryBackend::new()
                .with_sheet("Status_Updates_2025_Q1", &[StatusUpdate::COLUMNS, &row])
                .with_sheet("Status_Updates", &[StatusUpdate::COLUMNS, &row]),
        );
        let sheets = SheetNames::default();
        let reader =
            PartitionedLogReader::new(&table, &sheets, Quarter::new(2025, 1).expect("quarter"));
        let events = reader.fetch_event_log(&[epic("A-1", EpicState::Kickoff, Some("2025_Q1"))]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].dedup_key(), events[1].dedup_key());
    }
}
