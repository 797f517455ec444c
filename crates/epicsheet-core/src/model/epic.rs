use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::StoreError;
use crate::model::status::Platform;
use crate::quarter::Quarter;

/// The ten lifecycle states of an epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicState {
    Backlog,
    Kickoff,
    Planning,
    Development,
    CodeReview,
    Testing,
    ReadyToRelease,
    Released,
    Done,
    OnHold,
}

impl EpicState {
    /// All states in lifecycle order.
    pub const ALL: [Self; 10] = [
        Self::Backlog,
        Self::Kickoff,
        Self::Planning,
        Self::Development,
        Self::CodeReview,
        Self::Testing,
        Self::ReadyToRelease,
        Self::Released,
        Self::Done,
        Self::OnHold,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Kickoff => "kickoff",
            Self::Planning => "planning",
            Self::Development => "development",
            Self::CodeReview => "code_review",
            Self::Testing => "testing",
            Self::ReadyToRelease => "ready_to_release",
            Self::Released => "released",
            Self::Done => "done",
            Self::OnHold => "on_hold",
        }
    }

    /// `done` and `released` epics are complete; everything else is incomplete.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Done | Self::Released)
    }

    /// In-flight work: excludes backlog, on-hold and complete epics.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(
            self,
            Self::Backlog | Self::Done | Self::Released | Self::OnHold
        )
    }
}

impl Default for EpicState {
    fn default() -> Self {
        Self::Backlog
    }
}

impl fmt::Display for EpicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from sheet text or user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for EpicState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "epic status",
                got: s.to_string(),
            })
    }
}

/// Static metadata of one epic (one row of the `Epics` sheet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epic {
    pub epic_id: String,
    pub epic_name: String,
    pub epic_url: String,
    pub current_status: EpicState,
    pub ios_assignee: String,
    pub android_assignee: String,
    pub js_assignee: String,
    pub start_date: String,
    pub target_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prd_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_link: Option<String>,
    /// Partition key assigned at creation (or by the 1.1 migration).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_quarter: Option<Quarter>,
}

impl Epic {
    /// The assignee responsible for `platform`.
    #[must_use]
    pub fn assignee(&self, platform: Platform) -> &str {
        match platform {
            Platform::Ios => &self.ios_assignee,
            Platform::Android => &self.android_assignee,
            Platform::Js => &self.js_assignee,
        }
    }

    /// Whether `who` is assigned on any platform.
    #[must_use]
    pub fn is_assigned_to(&self, who: &str) -> bool {
        Platform::ALL.into_iter().any(|p| self.assignee(p) == who)
    }
}

/// Input for creating an epic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewEpic {
    pub epic_name: String,
    pub epic_url: String,
    pub ios_assignee: String,
    pub android_assignee: String,
    pub js_assignee: String,
    pub start_date: String,
    pub target_date: String,
    pub prd_link: Option<String>,
    pub tip_link: Option<String>,
    pub initial_status: Option<EpicState>,
    pub author: String,
}

/// Extract the epic id from a tracker URL of the form `.../browse/PREFIX-NUMBER`.
///
/// `PREFIX` is one or more ASCII uppercase letters and `NUMBER` one or more
/// digits; the id must be the final path segment.
///
/// # Errors
///
/// Returns [`StoreError::InvalidUrl`] if the URL does not end in a
/// `browse/PREFIX-NUMBER` segment.
pub fn epic_id_from_url(url: &str) -> Result<String, StoreError> {
    let invalid = || StoreError::InvalidUrl(url.to_string());
    let (head, id) = url.rsplit_once('/').ok_or_else(invalid)?;
    if !head.ends_with("/browse") {
        return Err(invalid());
    }
    let (prefix, number) = id.split_once('-').ok_or_else(invalid)?;
    let prefix_ok = !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_uppercase());
    let number_ok = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
    if prefix_ok && number_ok {
        Ok(id.to_string())
    } else {
        Err(invalid())
    }
}
