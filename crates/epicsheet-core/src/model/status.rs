use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::model::epic::ParseEnumError;

/// The three delivery platforms tracked per epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "Android")]
    Android,
    #[serde(rename = "JS")]
    Js,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::Ios, Self::Android, Self::Js];

    /// Label as stored in the `platform` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "iOS",
            Self::Android => "Android",
            Self::Js => "JS",
        }
    }

    /// Long display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Ios => "iOS",
            Self::Android => "Android",
            Self::Js => "JavaScript",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            "js" | "javascript" => Ok(Self::Js),
            _ => Err(ParseEnumError {
                expected: "platform",
                got: s.to_string(),
            }),
        }
    }
}

/// Current aggregate progress of one epic (one row of `Epic_Status`).
///
/// Absence of a row means no progress has been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicStatus {
    pub epic_id: String,
    pub ios_progress: u8,
    pub android_progress: u8,
    pub js_progress: u8,
    /// Free-text mirror of the epic's lifecycle state.
    pub overall_status: String,
    pub last_comment: String,
    pub last_updated: String,
    pub updated_by: String,
}

impl EpicStatus {
    /// A snapshot with no progress recorded.
    #[must_use]
    pub fn new(epic_id: impl Into<String>) -> Self {
        Self {
            epic_id: epic_id.into(),
            ios_progress: 0,
            android_progress: 0,
            js_progress: 0,
            overall_status: String::new(),
            last_comment: String::new(),
            last_updated: String::new(),
            updated_by: String::new(),
        }
    }

    #[must_use]
    pub const fn progress(&self, platform: Platform) -> u8 {
        match platform {
            Platform::Ios => self.ios_progress,
            Platform::Android => self.android_progress,
            Platform::Js => self.js_progress,
        }
    }

    /// Mean progress across the three platforms, rounded half up.
    #[must_use]
    pub fn overall_progress(&self) -> u8 {
        let sum = u32::from(self.ios_progress)
            + u32::from(self.android_progress)
            + u32::from(self.js_progress);
        u8::try_from((sum * 2 + 3) / 6).unwrap_or(100)
    }
}

/// Partial update of a status snapshot; `None` fields keep their value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusPatch {
    pub ios_progress: Option<u32>,
    pub android_progress: Option<u32>,
    pub js_progress: Option<u32>,
    pub overall_status: Option<String>,
    pub last_comment: Option<String>,
    pub updated_by: Option<String>,
}

impl StatusPatch {
    #[must_use]
    pub fn progress(mut self, platform: Platform, value: u32) -> Self {
        match platform {
            Platform::Ios => self.ios_progress = Some(value),
            Platform::Android => self.android_progress = Some(value),
            Platform::Js => self.js_progress = Some(value),
        }
        self
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.last_comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn overall_status(mut self, status: impl Into<String>) -> Self {
        self.overall_status = Some(status.into());
        self
    }

    #[must_use]
    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.updated_by = Some(author.into());
        self
    }

    /// Progress values that fall outside `0..=100`, if any.
    #[must_use]
    pub fn out_of_range_progress(&self) -> Option<u32> {
        [self.ios_progress, self.android_progress, self.js_progress]
            .into_iter()
            .flatten()
            .find(|value| *value > 100)
    }
}
