use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::model::epic::ParseEnumError;
use crate::model::status::Platform;

/// Closed set of event kinds in the status-update log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Progress,
    Blocker,
    Resolved,
    Comment,
    StatusChange,
}

impl UpdateKind {
    pub const ALL: [Self; 5] = [
        Self::Progress,
        Self::Blocker,
        Self::Resolved,
        Self::Comment,
        Self::StatusChange,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Blocker => "blocker",
            Self::Resolved => "resolved",
            Self::Comment => "comment",
            Self::StatusChange => "status_change",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "update type",
                got: s.to_string(),
            })
    }
}

/// One immutable entry of the status-update log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// RFC 3339 timestamp assigned at write time.
    pub timestamp: String,
    pub epic_id: String,
    #[serde(rename = "update_type")]
    pub kind: UpdateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub message: String,
    pub author: String,
}

impl StatusUpdate {
    /// Parsed timestamp, if well formed. Naive timestamps are taken as UTC.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|ts| ts.and_utc())
            })
    }

    /// Content hash identifying this event across partitions.
    ///
    /// Two rows with the same key are copies of one event. The log reader
    /// does not apply it; consumers that must not double count can.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [
            self.timestamp.as_str(),
            self.epic_id.as_str(),
            self.kind.as_str(),
            self.platform.map_or("", Platform::as_str),
            self.message.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0x1f]);
        }
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

/// An event before its timestamp is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatusUpdate {
    pub epic_id: String,
    pub kind: UpdateKind,
    pub platform: Option<Platform>,
    pub message: String,
    pub author: String,
}

impl NewStatusUpdate {
    #[must_use]
    pub fn new(
        epic_id: impl Into<String>,
        kind: UpdateKind,
        message: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            epic_id: epic_id.into(),
            kind,
            platform: None,
            message: message.into(),
            author: author.into(),
        }
    }

    #[must_use]
    pub const fn on(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    /// Stamp with `timestamp`.
    #[must_use]
    pub fn at(self, timestamp: String) -> StatusUpdate {
        StatusUpdate {
            timestamp,
            epic_id: self.epic_id,
            kind: self.kind,
            platform: self.platform,
            message: self.message,
            author: self.author,
        }
    }
}

/// Newest first; unparseable timestamps sort last, ties keep input order.
pub fn sort_newest_first(updates: &mut [StatusUpdate]) {
    updates.sort_by(|a, b| b.parsed_timestamp().cmp(&a.parsed_timestamp()));
}
