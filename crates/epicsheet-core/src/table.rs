//! Tabular store adapter.
//!
//! Typed read/write primitives over a [`SheetBackend`]. Reads marshal rows
//! into records; writes require a write credential, translate backend
//! failures into [`StoreError`]s and invalidate the snapshot cache on
//! success.

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{BackendError, Rows, SheetBackend};
use crate::cache::SnapshotCache;
use crate::error::StoreError;
use crate::sheet::{Record, SheetRow, parse_table, range};

pub struct TableStore {
    backend: Arc<dyn SheetBackend>,
    cache: Arc<SnapshotCache>,
    writable: bool,
}

impl TableStore {
    /// Wrap `backend`. Write capability is fixed at construction.
    #[must_use]
    pub fn new(backend: Arc<dyn SheetBackend>, cache: Arc<SnapshotCache>) -> Self {
        let writable = backend.is_writable();
        if !writable {
            info!("no write credential: store is read-only");
        }
        Self {
            backend,
            cache,
            writable,
        }
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::AuthRequired)
        }
    }

    /// Raw rows of a whole sheet, header included.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the sheet does not exist.
    pub fn fetch_table(&self, sheet: &str) -> Result<Rows, StoreError> {
        Ok(self.backend.read_range(&range::whole_sheet(sheet))?)
    }

    /// Header-keyed records of a sheet. An existing sheet with no data rows
    /// yields an empty vec.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the sheet does not exist.
    pub fn fetch_raw_records(&self, sheet: &str) -> Result<Vec<Record>, StoreError> {
        Ok(parse_table(&self.fetch_table(sheet)?))
    }

    /// Typed rows of a sheet, paired with their 1-based sheet row numbers.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the sheet does not exist.
    pub fn fetch_rows<T: SheetRow>(&self, sheet: &str) -> Result<Vec<(usize, T)>, StoreError> {
        Ok(self
            .fetch_raw_records(sheet)?
            .iter()
            .map(|record| (record.row(), T::from_record(record)))
            .collect())
    }

    /// Typed rows of a sheet.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the sheet does not exist.
    pub fn fetch_records<T: SheetRow>(&self, sheet: &str) -> Result<Vec<T>, StoreError> {
        Ok(self
            .fetch_raw_records(sheet)?
            .iter()
            .map(T::from_record)
            .collect())
    }

    /// Read several whole sheets in one round trip.
    ///
    /// # Errors
    ///
    /// Fails if any sheet is missing or the backend fails.
    pub fn batch_fetch(&self, sheets: &[&str]) -> Result<Vec<Rows>, StoreError> {
        let ranges: Vec<String> = sheets.iter().map(|s| range::whole_sheet(s)).collect();
        Ok(self.backend.batch_read(&ranges)?)
    }

    /// Overwrite `range` with `rows`.
    ///
    /// # Errors
    ///
    /// [`StoreError::AuthRequired`] without a credential (the backend is not
    /// contacted), otherwise translated backend failures.
    pub fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        debug!(range, rows = rows.len(), "write range");
        self.backend.write_range(range, rows)?;
        self.cache.invalidate();
        Ok(())
    }

    /// Append `rows` after the existing data of `sheet` over `width` columns.
    ///
    /// # Errors
    ///
    /// Same as [`TableStore::write_range`].
    pub fn append_rows(
        &self,
        sheet: &str,
        width: usize,
        rows: &[Vec<String>],
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let target = range::columns(sheet, 0, width.saturating_sub(1));
        debug!(range = %target, rows = rows.len(), "append rows");
        self.backend.append_range(&target, rows)?;
        self.cache.invalidate();
        Ok(())
    }

    /// Whether `sheet` exists.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn partition_exists(&self, sheet: &str) -> Result<bool, StoreError> {
        Ok(self.backend.list_sheets()?.iter().any(|name| name == sheet))
    }

    /// Create `sheet`. Returns `true` if it was created, `false` if it
    /// already existed; both count as success.
    ///
    /// # Errors
    ///
    /// [`StoreError::AuthRequired`] without a credential, otherwise
    /// translated backend failures.
    pub fn create_partition(&self, sheet: &str) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        match self.backend.create_sheet(sheet) {
            Ok(()) => {
                info!(sheet, "created sheet");
                self.cache.invalidate();
                Ok(true)
            }
            Err(BackendError::AlreadyExists(_)) => {
                debug!(sheet, "sheet already exists");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create `sheet` if needed and write `T`'s header into row 1.
    ///
    /// # Errors
    ///
    /// Same as [`TableStore::create_partition`].
    pub fn create_partition_with_header<T: SheetRow>(&self, sheet: &str) -> Result<bool, StoreError> {
        let created = self.create_partition(sheet)?;
        self.write_header::<T>(sheet)?;
        Ok(created)
    }

    /// Write `T`'s header into row 1 of `sheet`.
    ///
    /// # Errors
    ///
    /// Same as [`TableStore::write_range`].
    pub fn write_header<T: SheetRow>(&self, sheet: &str) -> Result<(), StoreError> {
        self.write_range(&range::row_span(sheet, 1, T::COLUMNS.len()), &[T::header()])
    }
}
