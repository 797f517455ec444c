//! Calendar-quarter partition keys.
//!
//! Status updates are partitioned into one sheet per calendar quarter, keyed
//! by the quarter in which the owning epic was created. Keys render as
//! `{year}_Q{1..4}` (e.g. `2026_Q3`) using the calendar year of the date,
//! never a fiscal year.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Sheet-name prefix for quarterly status-update partitions.
pub const DEFAULT_PARTITION_PREFIX: &str = "Status_Updates_";

/// A calendar quarter, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    year: i32,
    index: u8,
}

impl Quarter {
    /// Build a quarter from a year and a 1-based quarter index.
    ///
    /// Returns `None` when `index` is outside `1..=4`.
    #[must_use]
    pub const fn new(year: i32, index: u8) -> Option<Self> {
        if index >= 1 && index <= 4 {
            Some(Self { year, index })
        } else {
            None
        }
    }

    /// The quarter containing `date`: months 1-3 are Q1, ..., 10-12 are Q4.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        let index = u8::try_from(date.month0() / 3 + 1).unwrap_or(4);
        Self {
            year: date.year(),
            index,
        }
    }

    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// 1-based quarter number.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.index
    }

    /// The `{year}_Q{n}` label used in sheet names and the `created_quarter` column.
    #[must_use]
    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_Q{}", self.year, self.index)
    }
}

/// Error returned when parsing a quarter label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseQuarterError {
    pub raw: String,
}

impl fmt::Display for ParseQuarterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid quarter '{}': expected YYYY_Q1..YYYY_Q4", self.raw)
    }
}

impl std::error::Error for ParseQuarterError {}

impl FromStr for Quarter {
    type Err = ParseQuarterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseQuarterError { raw: s.to_string() };
        let (year, q) = s.trim().split_once("_Q").ok_or_else(err)?;
        let year: i32 = year.parse().map_err(|_| err())?;
        let index: u8 = q.parse().map_err(|_| err())?;
        Self::new(year, index).ok_or_else(err)
    }
}

impl Serialize for Quarter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The quarter of the local wall-clock date.
#[must_use]
pub fn current_quarter() -> Quarter {
    Quarter::from_date(Local::now().date_naive())
}

/// Parse a date (`YYYY-MM-DD`) or timestamp (RFC 3339 / ISO 8601) into a
/// calendar date.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDate`] if the string is not a valid
/// calendar date in any accepted form.
pub fn parse_date(raw: &str) -> Result<NaiveDate, StoreError> {
    let s = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts.date());
        }
    }
    Err(StoreError::InvalidDate(raw.to_string()))
}

/// The quarter containing the given date string.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDate`] if `raw` does not parse to a valid
/// calendar date.
pub fn quarter_of(raw: &str) -> Result<Quarter, StoreError> {
    parse_date(raw).map(Quarter::from_date)
}

/// Sheet name for the status-update partition of `quarter`, defaulting to
/// the current quarter.
#[must_use]
pub fn partition_name(prefix: &str, quarter: Option<Quarter>) -> String {
    let quarter = quarter.unwrap_or_else(current_quarter);
    format!("{prefix}{quarter}")
}
