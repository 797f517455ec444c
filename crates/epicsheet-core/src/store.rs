//! The store service behind every tool: one long-lived value owning the
//! backend adapter, the snapshot cache and the migration state.
//!
//! Every public operation first makes sure the workbook is at the target
//! schema version, then reads through the cache or writes through the
//! adapter. Writes invalidate the cache before returning.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{SheetBackend, open_backend};
use crate::cache::SnapshotCache;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::log_reader::PartitionedLogReader;
use crate::model::{
    Epic, EpicState, EpicStatus, NewEpic, NewStatusUpdate, SheetData, StatusPatch, StatusUpdate,
    UpdateKind, epic_id_from_url, timestamp_now,
};
use crate::quarter::{Quarter, current_quarter, partition_name};
use crate::sheet::{Record, SheetRow, parse_table, range};
use crate::table::TableStore;
use crate::version::{MigrationOutcome, MigrationState, SchemaVersion, VersionManager};

pub struct EpicStore {
    table: TableStore,
    config: StoreConfig,
    migration: MigrationState,
}

impl EpicStore {
    /// Build a store over an existing backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SheetBackend>, config: StoreConfig) -> Self {
        let cache = Arc::new(SnapshotCache::new(config.cache_ttl()));
        Self {
            table: TableStore::new(backend, cache),
            config,
            migration: MigrationState::new(),
        }
    }

    /// Build a store over the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] for incomplete configuration, or a backend
    /// error if the workbook cannot be opened.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let backend = open_backend(&config)?;
        Ok(Self::new(backend, config))
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.table.is_writable()
    }

    #[must_use]
    pub const fn migration_state(&self) -> &MigrationState {
        &self.migration
    }

    fn versions(&self) -> VersionManager<'_> {
        VersionManager::new(&self.table, &self.config, &self.migration)
    }

    /// Run the schema check (and migration) if it has not run yet.
    ///
    /// # Errors
    ///
    /// See [`VersionManager::ensure_up_to_date`].
    pub fn ensure_up_to_date(&self) -> Result<MigrationOutcome, StoreError> {
        self.versions().ensure_up_to_date(current_quarter())
    }

    /// The schema version recorded in the workbook.
    ///
    /// # Errors
    ///
    /// See [`VersionManager::read_stored_version`].
    pub fn stored_version(&self) -> Result<SchemaVersion, StoreError> {
        self.versions().read_stored_version()
    }

    /// Create the epics and status sheets if they are missing, with headers.
    ///
    /// A workbook with no epics sheet is brand new and has no legacy log to
    /// repartition, so its metadata is seeded at the target version. An
    /// existing workbook keeps whatever version it records. Returns the
    /// names of the sheets created.
    ///
    /// # Errors
    ///
    /// [`StoreError::AuthRequired`] when read-only, or backend failures.
    pub fn init_workbook(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_writable()?;
        let sheets = &self.config.sheets;
        let fresh = !self.table.partition_exists(&sheets.epics)?;

        let mut created = Vec::new();
        if self.table.create_partition(&sheets.epics)? {
            self.table.write_header::<Epic>(&sheets.epics)?;
            created.push(sheets.epics.clone());
        }
        if self.table.create_partition(&sheets.epic_status)? {
            self.table.write_header::<EpicStatus>(&sheets.epic_status)?;
            created.push(sheets.epic_status.clone());
        }
        if fresh && self.versions().initialize()? {
            created.push(sheets.metadata.clone());
        }
        info!(created = ?created, "workbook initialized");
        Ok(created)
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.table.is_writable() {
            Ok(())
        } else {
            Err(StoreError::AuthRequired)
        }
    }

    /// Epics, status snapshots and the merged event log.
    ///
    /// Served from the cache while fresh.
    ///
    /// # Errors
    ///
    /// Schema check failures, or a missing/unreadable epics or status sheet.
    /// Event partitions that cannot be read are skipped.
    pub fn fetch_all_data(&self) -> Result<Arc<SheetData>, StoreError> {
        self.ensure_up_to_date()?;
        if let Some(data) = self.table.cache().get() {
            return Ok(data);
        }
        let generation = self.table.cache().generation();

        let sheets = &self.config.sheets;
        let (epic_rows, status_rows) =
            match self
                .table
                .batch_fetch(&[sheets.epics.as_str(), sheets.epic_status.as_str()])
            {
                Ok(mut tables) if tables.len() == 2 => {
                    let status = tables.pop().unwrap_or_default();
                    let epics = tables.pop().unwrap_or_default();
                    (epics, status)
                }
                Ok(_) | Err(_) => {
                    debug!("batch read failed, falling back to per-sheet reads");
                    (
                        self.table.fetch_table(&sheets.epics)?,
                        self.table.fetch_table(&sheets.epic_status)?,
                    )
                }
            };
        let epics: Vec<Epic> = parse_table(&epic_rows).iter().map(Epic::from_record).collect();
        let statuses: Vec<EpicStatus> = parse_table(&status_rows)
            .iter()
            .map(EpicStatus::from_record)
            .collect();
        let updates =
            PartitionedLogReader::new(&self.table, sheets, current_quarter()).fetch_event_log(&epics);

        debug!(
            epics = epics.len(),
            statuses = statuses.len(),
            updates = updates.len(),
            "fetched workbook"
        );
        Ok(self.table.cache().put(generation, SheetData {
            epics,
            statuses,
            updates,
        }))
    }

    /// Merge `patch` into the epic's status snapshot, creating the row if
    /// absent. `last_updated` is always stamped.
    ///
    /// # Errors
    ///
    /// [`StoreError::AuthRequired`] when read-only,
    /// [`StoreError::InvalidProgress`] for progress above 100, or backend
    /// failures.
    pub fn update_status_snapshot(&self, epic_id: &str, patch: &StatusPatch) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        if let Some(progress) = patch.out_of_range_progress() {
            return Err(StoreError::InvalidProgress(progress));
        }
        self.ensure_up_to_date()?;

        let sheet = &self.config.sheets.epic_status;
        let existing = self
            .table
            .fetch_rows::<EpicStatus>(sheet)?
            .into_iter()
            .find(|(_, status)| status.epic_id == epic_id);
        let (row, mut status) = match existing {
            Some((row, status)) => (Some(row), status),
            None => (None, EpicStatus::new(epic_id)),
        };
        apply_patch(&mut status, patch);
        status.last_updated = timestamp_now();

        let width = EpicStatus::COLUMNS.len();
        match row {
            Some(row) => self
                .table
                .write_range(&range::row_span(sheet, row, width), &[status.to_row()])?,
            None => {
                debug!(epic_id, "no status row yet, appending one");
                self.table.append_rows(sheet, width, &[status.to_row()])?;
            }
        }
        Ok(true)
    }

    /// Append an event stamped with the current time, routed to the
    /// partition of the epic's `created_quarter` (created on demand), or to
    /// the legacy log when the epic has none.
    ///
    /// # Errors
    ///
    /// [`StoreError::AuthRequired`] when read-only, or backend failures.
    pub fn append_event(&self, update: NewStatusUpdate) -> Result<StatusUpdate, StoreError> {
        self.ensure_writable()?;
        self.ensure_up_to_date()?;

        let quarter = self.assigned_quarter(&update.epic_id)?;
        let sheet = self.event_sheet(quarter);
        if quarter.is_some() && !self.table.partition_exists(&sheet)? {
            info!(sheet = %sheet, "creating event partition");
            self.table.create_partition_with_header::<StatusUpdate>(&sheet)?;
        }

        let event = update.at(timestamp_now());
        self.table
            .append_rows(&sheet, StatusUpdate::COLUMNS.len(), &[event.to_row()])?;
        debug!(epic_id = %event.epic_id, sheet = %sheet, kind = %event.kind, "appended event");
        Ok(event)
    }

    /// Set the epic's lifecycle state.
    ///
    /// # Errors
    ///
    /// [`StoreError::WorkItemNotFound`] for an unknown id,
    /// [`StoreError::AuthRequired`] when read-only, or backend failures.
    pub fn change_work_item_status(&self, epic_id: &str, state: EpicState) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        self.ensure_up_to_date()?;

        let sheet = &self.config.sheets.epics;
        let raw = self.table.fetch_table(sheet)?;
        let row = parse_table(&raw)
            .iter()
            .find(|record| record.text("epic_id").trim() == epic_id)
            .map(Record::row)
            .ok_or_else(|| StoreError::WorkItemNotFound(epic_id.to_string()))?;
        let col = raw
            .first()
            .and_then(|header| header.iter().position(|h| h.trim() == "current_status"))
            .or_else(|| Epic::column("current_status"))
            .unwrap_or(3);
        self.table.write_range(
            &range::cell(sheet, col, row),
            &[vec![state.as_str().to_string()]],
        )?;
        info!(epic_id, status = %state, "changed epic status");
        Ok(true)
    }

    /// Create an epic, its status row and a creation event. Returns the id
    /// extracted from the URL.
    ///
    /// The creation event is best effort: failing to write it is logged and
    /// does not fail the call.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidUrl`] if no id can be extracted,
    /// [`StoreError::DuplicateWorkItem`] if it already exists,
    /// [`StoreError::AuthRequired`] when read-only, or backend failures.
    pub fn create_work_item(&self, new: &NewEpic) -> Result<String, StoreError> {
        self.ensure_writable()?;
        let epic_id = epic_id_from_url(&new.epic_url)?;
        self.ensure_up_to_date()?;

        if self.find_epic_row(&epic_id)?.is_some() {
            return Err(StoreError::DuplicateWorkItem(epic_id));
        }

        let state = new.initial_status.unwrap_or_default();
        let epic = Epic {
            epic_id: epic_id.clone(),
            epic_name: new.epic_name.clone(),
            epic_url: new.epic_url.clone(),
            current_status: state,
            ios_assignee: new.ios_assignee.clone(),
            android_assignee: new.android_assignee.clone(),
            js_assignee: new.js_assignee.clone(),
            start_date: new.start_date.clone(),
            target_date: new.target_date.clone(),
            prd_link: new.prd_link.clone(),
            tip_link: new.tip_link.clone(),
            created_quarter: Some(current_quarter()),
        };
        let sheets = &self.config.sheets;
        self.table
            .append_rows(&sheets.epics, Epic::COLUMNS.len(), &[epic.to_row()])?;

        let status = EpicStatus {
            overall_status: state.as_str().to_string(),
            last_comment: "Epic created".to_string(),
            last_updated: timestamp_now(),
            updated_by: new.author.clone(),
            ..EpicStatus::new(&epic_id)
        };
        self.table
            .append_rows(&sheets.epic_status, EpicStatus::COLUMNS.len(), &[status.to_row()])?;
        info!(epic_id = %epic_id, quarter = ?epic.created_quarter, "created epic");

        let audit = NewStatusUpdate::new(
            &epic_id,
            UpdateKind::StatusChange,
            format!("Epic created: {}", new.epic_name),
            &new.author,
        );
        if let Err(err) = self.append_event(audit) {
            warn!(epic_id = %epic_id, error = %err, "failed to record creation event");
        }
        Ok(epic_id)
    }

    /// All events of one epic, from its partition (or the legacy log when
    /// unassigned), in log order. A missing partition yields no events.
    ///
    /// # Errors
    ///
    /// Schema check or backend failures other than a missing partition.
    pub fn fetch_event_history(&self, epic_id: &str) -> Result<Vec<StatusUpdate>, StoreError> {
        self.ensure_up_to_date()?;
        let quarter = self.assigned_quarter(epic_id)?;
        let sheet = self.event_sheet(quarter);
        match self.table.fetch_records::<StatusUpdate>(&sheet) {
            Ok(rows) => Ok(rows.into_iter().filter(|u| u.epic_id == epic_id).collect()),
            Err(StoreError::NotFound { .. }) => {
                debug!(sheet = %sheet, "event partition missing, no history");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Look an epic up in the epics sheet, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Schema check or backend failures.
    pub fn find_epic(&self, epic_id: &str) -> Result<Option<Epic>, StoreError> {
        self.ensure_up_to_date()?;
        Ok(self.find_epic_row(epic_id)?.map(|(_, epic)| epic))
    }

    fn find_epic_row(&self, epic_id: &str) -> Result<Option<(usize, Epic)>, StoreError> {
        Ok(self
            .table
            .fetch_rows::<Epic>(&self.config.sheets.epics)?
            .into_iter()
            .find(|(_, epic)| epic.epic_id == epic_id))
    }

    fn assigned_quarter(&self, epic_id: &str) -> Result<Option<Quarter>, StoreError> {
        Ok(self
            .find_epic_row(epic_id)?
            .and_then(|(_, epic)| epic.created_quarter))
    }

    fn event_sheet(&self, quarter: Option<Quarter>) -> String {
        let sheets = &self.config.sheets;
        quarter.map_or_else(
            || sheets.legacy_updates.clone(),
            |q| partition_name(&sheets.partition_prefix, Some(q)),
        )
    }
}

fn apply_patch(status: &mut EpicStatus, patch: &StatusPatch) {
    let clamp = |v: u32| u8::try_from(v.min(100)).unwrap_or(100);
    if let Some(v) = patch.ios_progress {
        status.ios_progress = clamp(v);
    }
    if let Some(v) = patch.android_progress {
        status.android_progress = clamp(v);
    }
    if let Some(v) = patch.js_progress {
        status.js_progress = clamp(v);
    }
    if let Some(v) = &patch.overall_status {
        status.overall_status.clone_from(v);
    }
    if let Some(v) = &patch.last_comment {
        status.last_comment.clone_from(v);
    }
    if let Some(v) = &patch.updated_by {
        status.updated_by.clone_from(v);
    }
}
