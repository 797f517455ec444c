//! Schema version manager.
//!
//! The workbook's structural version lives in the `Metadata` sheet as a
//! `schema_version` row. Before any store operation the manager compares it
//! with [`TARGET_VERSION`] and, when major or minor differ, walks the
//! registered migration steps between the two. The check runs at most once
//! per [`MigrationState`]: once it succeeds the gate stays open and later
//! calls return immediately.
//!
//! Metadata is always read through the raw [`TableStore`], never through
//! the checked store operations, so a version check cannot trigger another
//! version check.

pub mod quarterly;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::{MetadataEntry, timestamp_now};
use crate::quarter::Quarter;
use crate::sheet::{SheetRow, range};
use crate::table::TableStore;

pub use quarterly::RepartitionReport;

/// Version this build reads and writes.
pub const TARGET_VERSION: SchemaVersion = SchemaVersion::new(1, 1, 0);

/// Version stamped into a freshly created `Metadata` sheet. A new workbook
/// starts at the oldest known layout so its first run migrates deliberately.
pub const SEED_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 2);

pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const CREATED_AT_KEY: &str = "created_at";
pub const LAST_MIGRATION_KEY: &str = "last_migration";

/// A `MAJOR.MINOR.PATCH` schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Migration is required iff major or minor differ; patch-only
    /// differences never migrate.
    #[must_use]
    pub const fn needs_migration(self, target: Self) -> bool {
        self.major != target.major || self.minor != target.minor
    }

    const fn line(self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = StoreError;

    /// Missing components read as 0 (`"1.1"` is `1.1.0`); a leading `v` is
    /// accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || StoreError::InvalidSchemaVersion(s.to_string());
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(err());
        }
        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in trimmed.split('.') {
            let slot = parts.get_mut(count).ok_or_else(err)?;
            *slot = piece.parse().map_err(|_| err())?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// String form of [`SchemaVersion::needs_migration`].
///
/// # Errors
///
/// [`StoreError::InvalidSchemaVersion`] if either side does not parse.
pub fn needs_migration(stored: &str, target: &str) -> Result<bool, StoreError> {
    Ok(stored
        .parse::<SchemaVersion>()?
        .needs_migration(target.parse()?))
}

/// Lifecycle of the version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unchecked,
    Checking,
    UpToDate,
    Migrating,
    Migrated,
}

/// Version-check state owned by one long-lived store.
#[derive(Debug)]
pub struct MigrationState {
    complete: AtomicBool,
    phase: Mutex<Phase>,
    stored: Mutex<Option<SchemaVersion>>,
    run: Mutex<()>,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self::new()
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MigrationState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            complete: AtomicBool::new(false),
            phase: Mutex::new(Phase::Unchecked),
            stored: Mutex::new(None),
            run: Mutex::new(()),
        }
    }

    /// Whether the gate is open.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *relock(&self.phase)
    }

    /// Stored version cached by the last successful read or write.
    #[must_use]
    pub fn stored_version(&self) -> Option<SchemaVersion> {
        *relock(&self.stored)
    }

    fn set_phase(&self, phase: Phase) {
        *relock(&self.phase) = phase;
    }

    fn remember(&self, version: SchemaVersion) {
        *relock(&self.stored) = Some(version);
    }

    fn open(&self, phase: Phase) {
        self.set_phase(phase);
        self.complete.store(true, Ordering::Release);
    }
}

/// Result of [`VersionManager::ensure_up_to_date`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The gate was already open; nothing was read.
    AlreadyChecked,
    UpToDate { version: SchemaVersion },
    Migrated {
        from: SchemaVersion,
        to: SchemaVersion,
        steps: Vec<RepartitionReport>,
    },
    /// The workbook is behind but there is no credential to migrate it.
    SkippedReadOnly { stored: SchemaVersion },
}

/// What a migration step may touch.
pub struct MigrationContext<'a> {
    pub table: &'a TableStore,
    pub config: &'a StoreConfig,
    pub current: Quarter,
}

type StepFn = fn(&MigrationContext<'_>) -> Result<RepartitionReport, StoreError>;

struct MigrationStep {
    from: (u32, u32),
    to: (u32, u32),
    name: &'static str,
    run: StepFn,
}

const MIGRATIONS: &[MigrationStep] = &[MigrationStep {
    from: (1, 0),
    to: (1, 1),
    name: "repartition status updates by quarter",
    run: quarterly::run,
}];

/// Steps leading from `from` to `to`, in order.
fn plan(from: SchemaVersion, to: SchemaVersion) -> Result<Vec<&'static MigrationStep>, StoreError> {
    let unsupported = || StoreError::UnsupportedMigration {
        from: from.to_string(),
        to: to.to_string(),
    };
    let mut line = from.line();
    let mut steps = Vec::new();
    while line != to.line() {
        let step = MIGRATIONS
            .iter()
            .find(|step| step.from == line && step.to <= to.line())
            .ok_or_else(unsupported)?;
        steps.push(step);
        line = step.to;
    }
    Ok(steps)
}

/// Whether a registered path leads from `from` to `to`.
#[must_use]
pub fn is_supported(from: SchemaVersion, to: SchemaVersion) -> bool {
    plan(from, to).is_ok()
}

pub struct VersionManager<'a> {
    table: &'a TableStore,
    config: &'a StoreConfig,
    state: &'a MigrationState,
}

impl<'a> VersionManager<'a> {
    #[must_use]
    pub const fn new(table: &'a TableStore, config: &'a StoreConfig, state: &'a MigrationState) -> Self {
        Self {
            table,
            config,
            state,
        }
    }

    fn metadata_sheet(&self) -> &str {
        &self.config.sheets.metadata
    }

    /// Bring the workbook to [`TARGET_VERSION`], once per state.
    ///
    /// # Errors
    ///
    /// Any failure while reading the version or running a step. The version
    /// is not persisted and the gate stays closed, so the next call retries.
    pub fn ensure_up_to_date(&self, current: Quarter) -> Result<MigrationOutcome, StoreError> {
        if self.state.is_complete() {
            return Ok(MigrationOutcome::AlreadyChecked);
        }
        let _running = relock(&self.state.run);
        if self.state.is_complete() {
            return Ok(MigrationOutcome::AlreadyChecked);
        }

        self.state.set_phase(Phase::Checking);
        let result = self.check_and_migrate(current);
        if result.is_err() {
            self.state.set_phase(Phase::Unchecked);
        }
        result
    }

    fn check_and_migrate(&self, current: Quarter) -> Result<MigrationOutcome, StoreError> {
        let stored = self.read_stored_version()?;
        if !stored.needs_migration(TARGET_VERSION) {
            info!(version = %stored, "schema is up to date");
            self.state.open(Phase::UpToDate);
            return Ok(MigrationOutcome::UpToDate { version: stored });
        }

        if !self.table.is_writable() {
            warn!(
                stored = %stored,
                target = %TARGET_VERSION,
                "schema is behind but the store is read-only, skipping migration"
            );
            self.state.open(Phase::UpToDate);
            return Ok(MigrationOutcome::SkippedReadOnly { stored });
        }

        let steps = plan(stored, TARGET_VERSION)?;
        self.state.set_phase(Phase::Migrating);
        info!(from = %stored, to = %TARGET_VERSION, steps = steps.len(), "starting schema migration");

        let ctx = MigrationContext {
            table: self.table,
            config: self.config,
            current,
        };
        let mut reports = Vec::with_capacity(steps.len());
        for step in steps {
            info!(step = step.name, "running migration step");
            reports.push((step.run)(&ctx)?);
        }

        self.write_stored_version(TARGET_VERSION)?;
        self.upsert_metadata(LAST_MIGRATION_KEY, &format!("{stored} -> {TARGET_VERSION}"))?;
        info!(from = %stored, to = %TARGET_VERSION, "schema migration complete");
        self.state.open(Phase::Migrated);
        Ok(MigrationOutcome::Migrated {
            from: stored,
            to: TARGET_VERSION,
            steps: reports,
        })
    }

    /// The stored schema version, cached after the first successful read.
    ///
    /// A missing `Metadata` sheet is created and seeded with
    /// [`SEED_VERSION`] (when writable); a sheet without a version row reads
    /// as [`SEED_VERSION`].
    ///
    /// # Errors
    ///
    /// Backend failures other than a missing sheet, or a malformed version.
    pub fn read_stored_version(&self) -> Result<SchemaVersion, StoreError> {
        if let Some(version) = self.state.stored_version() {
            return Ok(version);
        }
        let version = match self.table.fetch_records::<MetadataEntry>(self.metadata_sheet()) {
            Ok(entries) => version_from(&entries)?,
            Err(StoreError::NotFound { .. }) => self.seed_metadata(SEED_VERSION)?,
            Err(err) => return Err(err),
        };
        self.state.remember(version);
        Ok(version)
    }

    /// Create and seed the metadata sheet of a brand-new workbook at
    /// [`TARGET_VERSION`]. Returns `false` if the sheet already existed, in
    /// which case nothing is written.
    ///
    /// # Errors
    ///
    /// [`StoreError::AuthRequired`] when read-only, or backend failures.
    pub fn initialize(&self) -> Result<bool, StoreError> {
        if !self.table.is_writable() {
            return Err(StoreError::AuthRequired);
        }
        if self.table.partition_exists(self.metadata_sheet())? {
            return Ok(false);
        }
        let version = self.seed_metadata(TARGET_VERSION)?;
        self.state.remember(version);
        Ok(true)
    }

    fn seed_metadata(&self, version: SchemaVersion) -> Result<SchemaVersion, StoreError> {
        let sheet = self.metadata_sheet();
        if !self.table.is_writable() {
            warn!(sheet, "metadata sheet missing and store is read-only; assuming seed version");
            return Ok(SEED_VERSION);
        }
        info!(sheet, version = %version, "metadata sheet missing, creating it");
        if !self.table.create_partition(sheet)? {
            // Created concurrently by another writer: use what it stored.
            return version_from(&self.table.fetch_records::<MetadataEntry>(sheet)?);
        }
        let now = timestamp_now();
        let today = now.split('T').next().unwrap_or_default().to_string();
        let rows: Vec<Vec<String>> = [
            (SCHEMA_VERSION_KEY, version.to_string()),
            (CREATED_AT_KEY, today),
            (LAST_MIGRATION_KEY, "none".to_string()),
        ]
        .into_iter()
        .map(|(key, value)| {
            MetadataEntry {
                key: key.to_string(),
                value,
                updated_at: now.clone(),
            }
            .to_row()
        })
        .collect();
        let mut block = vec![MetadataEntry::header()];
        block.extend(rows);
        let width = MetadataEntry::COLUMNS.len();
        self.table
            .write_range(&range::box_range(sheet, 1, block.len(), width), &block)?;
        Ok(version)
    }

    /// Persist `version` and update the cached copy.
    ///
    /// # Errors
    ///
    /// Backend failures, or [`StoreError::AuthRequired`] when read-only.
    pub fn write_stored_version(&self, version: SchemaVersion) -> Result<(), StoreError> {
        self.upsert_metadata(SCHEMA_VERSION_KEY, &version.to_string())?;
        self.state.remember(version);
        Ok(())
    }

    /// Update the row for `key` in place, or append one.
    ///
    /// # Errors
    ///
    /// Backend failures, or [`StoreError::AuthRequired`] when read-only.
    pub fn upsert_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let sheet = self.metadata_sheet();
        let entry = MetadataEntry {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: timestamp_now(),
        };
        let width = MetadataEntry::COLUMNS.len();
        let existing = self
            .table
            .fetch_rows::<MetadataEntry>(sheet)?
            .into_iter()
            .find(|(_, row)| row.key == key);
        match existing {
            Some((row, _)) => self
                .table
                .write_range(&range::row_span(sheet, row, width), &[entry.to_row()]),
            None => self.table.append_rows(sheet, width, &[entry.to_row()]),
        }
    }
}

fn version_from(entries: &[MetadataEntry]) -> Result<SchemaVersion, StoreError> {
    match entries.iter().find(|e| e.key == SCHEMA_VERSION_KEY) {
        Some(entry) => entry.value.parse(),
        None => {
            warn!("metadata has no schema_version row; assuming seed version");
            Ok(SEED_VERSION)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SheetBackend;
    use crate::backend::memory::{MemoryBackend, Op};
    use crate::cache::SnapshotCache;
    use crate::quarter::current_quarter;
    use std::sync::Arc;

    fn v(s: &str) -> SchemaVersion {
        s.parse().expect("version")
    }

    fn table(backend: &Arc<MemoryBackend>) -> TableStore {
        let dyn_backend: Arc<dyn SheetBackend> = backend.clone();
        TableStore::new(dyn_backend, Arc::new(SnapshotCache::new(std::time::Duration::ZERO)))
    }

    #[test]
    fn parse_is_tolerant_of_missing_parts() {
        assert_eq!(v("1.1"), SchemaVersion::new(1, 1, 0));
        assert_eq!(v("2"), SchemaVersion::new(2, 0, 0));
        assert_eq!(v(" v1.0.2 "), SEED_VERSION);
        for bad in ["", "one.two", "1.x.0", "1.2.3.4", "1..2"] {
            assert!(bad.parse::<SchemaVersion>().is_err(), "{bad}");
        }
    }

    #[test]
    fn patch_differences_do_not_migrate() {
        assert!(!needs_migration("1.0.2", "1.0.9").expect("parse"));
        assert!(needs_migration("1.0.2", "1.1.0").expect("parse"));
        assert!(needs_migration("1.1.0", "2.0.0").expect("parse"));
        assert!(!needs_migration("1.1.0", "1.1.0").expect("parse"));
        assert!(needs_migration("bogus", "1.1.0").is_err());
    }

    #[test]
    fn only_registered_transitions_are_supported() {
        assert!(is_supported(v("1.0.2"), v("1.1.0")));
        assert!(is_supported(v("1.0.0"), v("1.1.5")));
        assert!(!is_supported(v("1.1.0"), v("1.0.2")));
        assert!(!is_supported(v("0.9.0"), v("1.1.0")));
        assert!(!is_supported(v("1.0.2"), v("2.0.0")));
        assert!(matches!(
            plan(v("2.0.0"), TARGET_VERSION),
            Err(StoreError::UnsupportedMigration { .. })
        ));
    }

    #[test]
    fn missing_metadata_is_seeded() {
        let backend = Arc::new(MemoryBackend::new());
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);

        assert_eq!(manager.read_stored_version().expect("read"), SEED_VERSION);
        let rows = backend.sheet("Metadata").expect("created");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], MetadataEntry::header());
        assert_eq!(rows[1][0], "schema_version");
        assert_eq!(rows[1][1], "1.0.2");
        assert_eq!(rows[3][1], "none");
    }

    #[test]
    fn initialize_seeds_target_version_once() {
        let backend = Arc::new(MemoryBackend::new());
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);

        assert!(manager.initialize().expect("init"));
        assert!(!manager.initialize().expect("init again"));
        let rows = backend.sheet("Metadata").expect("created");
        assert_eq!(rows[1][1], "1.1.0");
        assert_eq!(
            manager.ensure_up_to_date(current_quarter()).expect("check"),
            MigrationOutcome::UpToDate { version: TARGET_VERSION }
        );
    }

    #[test]
    fn stored_version_is_read_once() {
        let backend = Arc::new(MemoryBackend::new().with_sheet(
            "Metadata",
            &[&["key", "value", "updated_at"], &["schema_version", "1.1.0", ""]],
        ));
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);
        assert_eq!(manager.read_stored_version().expect("read"), TARGET_VERSION);
        assert_eq!(manager.read_stored_version().expect("read"), TARGET_VERSION);
        assert_eq!(backend.calls(Op::Read), 1);
    }

    #[test]
    fn upsert_updates_in_place_or_appends() {
        let backend = Arc::new(MemoryBackend::new().with_sheet(
            "Metadata",
            &[
                &["key", "value", "updated_at"],
                &["schema_version", "1.0.2", ""],
                &["created_at", "2024-01-01", ""],
            ],
        ));
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);

        manager.write_stored_version(TARGET_VERSION).expect("write");
        manager.upsert_metadata("last_migration", "1.0.2 -> 1.1.0").expect("append");
        let rows = backend.sheet("Metadata").expect("sheet");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][1], "1.1.0");
        assert_eq!(rows[3][0], "last_migration");
        assert_eq!(state.stored_version(), Some(TARGET_VERSION));
    }

    #[test]
    fn up_to_date_opens_gate_without_writes() {
        let backend = Arc::new(MemoryBackend::new().with_sheet(
            "Metadata",
            &[&["key", "value", "updated_at"], &["schema_version", "1.1.3", ""]],
        ));
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);

        let outcome = manager.ensure_up_to_date(current_quarter()).expect("check");
        assert_eq!(outcome, MigrationOutcome::UpToDate { version: v("1.1.3") });
        assert!(state.is_complete());
        assert_eq!(state.phase(), Phase::UpToDate);
        assert_eq!(
            manager.ensure_up_to_date(current_quarter()).expect("check"),
            MigrationOutcome::AlreadyChecked
        );
        assert_eq!(backend.calls(Op::Write), 0);
        assert_eq!(backend.calls(Op::Read), 1);
    }

    #[test]
    fn newer_major_is_unsupported_and_gate_stays_closed() {
        let backend = Arc::new(MemoryBackend::new().with_sheet(
            "Metadata",
            &[&["key", "value", "updated_at"], &["schema_version", "2.0.0", ""]],
        ));
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);
        let err = manager.ensure_up_to_date(current_quarter()).expect_err("unsupported");
        assert!(matches!(err, StoreError::UnsupportedMigration { .. }));
        assert!(!state.is_complete());
        assert_eq!(state.phase(), Phase::Unchecked);
    }

    #[test]
    fn read_only_store_skips_migration() {
        let backend = Arc::new(MemoryBackend::read_only());
        let table = table(&backend);
        let config = StoreConfig::default();
        let state = MigrationState::new();
        let manager = VersionManager::new(&table, &config, &state);
        let outcome = manager.ensure_up_to_date(current_quarter()).expect("check");
        assert_eq!(outcome, MigrationOutcome::SkippedReadOnly { stored: SEED_VERSION });
        assert!(state.is_complete());
        assert_eq!(backend.calls(Op::Write) + backend.calls(Op::CreateSheet), 0);
    }
}
