//! Typed records for the four tables of the workbook.

pub mod epic;
mod rows;
pub mod status;
pub mod update;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub use epic::{Epic, EpicState, NewEpic, ParseEnumError, epic_id_from_url};
pub use status::{EpicStatus, Platform, StatusPatch};
pub use update::{NewStatusUpdate, StatusUpdate, UpdateKind, sort_newest_first};

/// Write-time timestamp: RFC 3339, UTC, millisecond precision.
#[must_use]
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One key/value row of the `Metadata` sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// The merged read view returned by `fetch_all_data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetData {
    pub epics: Vec<Epic>,
    pub statuses: Vec<EpicStatus>,
    pub updates: Vec<StatusUpdate>,
}

impl SheetData {
    #[must_use]
    pub fn epic(&self, epic_id: &str) -> Option<&Epic> {
        self.epics.iter().find(|e| e.epic_id == epic_id)
    }

    #[must_use]
    pub fn status(&self, epic_id: &str) -> Option<&EpicStatus> {
        self.statuses.iter().find(|s| s.epic_id == epic_id)
    }

    /// Events of one epic, in log order.
    pub fn updates_for<'a>(&'a self, epic_id: &'a str) -> impl Iterator<Item = &'a StatusUpdate> {
        self.updates.iter().filter(move |u| u.epic_id == epic_id)
    }
}
