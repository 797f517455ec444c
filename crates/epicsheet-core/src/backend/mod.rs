//! Tabular-store backends.
//!
//! A backend is the raw spreadsheet collaborator: it reads and writes
//! rectangular ranges of string cells addressed in A1 notation and manages
//! the set of sheets. Everything above this layer (marshalling, caching,
//! partition routing, migrations) is backend-agnostic.

pub mod google;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use crate::config::{BackendKind, StoreConfig};
use crate::error::StoreError;

pub use google::GoogleSheetsBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// A block of cell values, row-major. Rows may be ragged.
pub type Rows = Vec<Vec<String>>;

/// Failures reported by a backend.
///
/// The variants distinguish the cases callers must branch on: a missing
/// range is not the same as an empty one, and "already exists" on sheet
/// creation is benign.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("range not found: {0}")]
    NotFound(String),

    #[error("sheet already exists: {0}")]
    AlreadyExists(String),

    #[error("credential rejected: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Classify an HTTP error response.
    ///
    /// `range` names the resource the request addressed and is carried by
    /// [`BackendError::NotFound`] and [`BackendError::AlreadyExists`].
    #[must_use]
    pub fn from_status(code: u16, body: &str, range: &str) -> Self {
        match code {
            401 => Self::Unauthenticated(body.to_string()),
            403 => Self::PermissionDenied(body.to_string()),
            404 => Self::NotFound(range.to_string()),
            400 if body.contains("Unable to parse range") => Self::NotFound(range.to_string()),
            400 if body.contains("already exists") => Self::AlreadyExists(range.to_string()),
            _ => Self::Status {
                code,
                body: body.to_string(),
            },
        }
    }
}

/// The operations the data-access layer requires from a spreadsheet.
///
/// Implementations must report a missing sheet or unparseable range as
/// [`BackendError::NotFound`] and an existing-but-empty range as `Ok(vec![])`.
pub trait SheetBackend: Send + Sync {
    /// Read several ranges in one round trip, in request order.
    ///
    /// # Errors
    ///
    /// Fails if any single range fails.
    fn batch_read(&self, ranges: &[String]) -> Result<Vec<Rows>, BackendError> {
        ranges.iter().map(|range| self.read_range(range)).collect()
    }

    /// Read one range. Trailing empty rows and cells are trimmed.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotFound`] if the sheet or range does not exist.
    fn read_range(&self, range: &str) -> Result<Rows, BackendError>;

    /// Overwrite cells starting at the top-left of `range`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError>;

    /// Append rows after the last non-empty row of `range`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn append_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError>;

    /// Names of all sheets in the workbook.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn list_sheets(&self) -> Result<Vec<String>, BackendError>;

    /// Add an empty sheet.
    ///
    /// # Errors
    ///
    /// [`BackendError::AlreadyExists`] if a sheet with this name exists.
    fn create_sheet(&self, name: &str) -> Result<(), BackendError>;

    /// Whether this backend holds a write-capable credential.
    fn is_writable(&self) -> bool;
}

/// Build the backend selected by `config`.
///
/// # Errors
///
/// Returns [`StoreError::Config`] when the selected backend is missing a
/// required setting, or a backend error if the sqlite workbook cannot be
/// opened.
pub fn open_backend(config: &StoreConfig) -> Result<Arc<dyn SheetBackend>, StoreError> {
    match &config.backend {
        BackendKind::Google => {
            let spreadsheet_id = config
                .spreadsheet_id
                .as_deref()
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| {
                    StoreError::Config(
                        "SPREADSHEET_ID is required for the google backend".to_string(),
                    )
                })?;
            let backend = GoogleSheetsBackend::new(spreadsheet_id, config.access_token.clone());
            if !backend.is_writable() {
                info!("no write credential configured, operating in read-only mode");
            }
            Ok(Arc::new(backend))
        }
        BackendKind::Sqlite(path) => Ok(Arc::new(SqliteBackend::open(path)?)),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_range_is_not_found() {
        let err = BackendError::from_status(
            400,
            "Unable to parse range: Status_Updates_2024_Q1!A:Z",
            "Status_Updates_2024_Q1!A:Z",
        );
        assert_eq!(
            err,
            BackendError::NotFound("Status_Updates_2024_Q1!A:Z".to_string())
        );
    }

    #[test]
    fn duplicate_sheet_is_already_exists() {
        let err = BackendError::from_status(
            400,
            "Invalid requests[0].addSheet: A sheet with the name \"Metadata\" already exists.",
            "Metadata",
        );
        assert_eq!(err, BackendError::AlreadyExists("Metadata".to_string()));
    }

    #[test]
    fn other_statuses_are_preserved() {
        let err = BackendError::from_status(503, "unavailable", "Epics!A:Z");
        assert!(matches!(err, BackendError::Status { code: 503, .. }));
    }

    #[test]
    fn google_backend_requires_spreadsheet_id() {
        let config = StoreConfig::default();
        let err = open_backend(&config).err().expect("must fail");
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn memory_backend_is_writable() {
        let config = StoreConfig {
            backend: BackendKind::Memory,
            ..StoreConfig::default()
        };
        let backend = open_backend(&config).expect("memory backend");
        assert!(backend.is_writable());
    }
}
