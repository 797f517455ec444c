//! Row marshalling between raw sheet cells and typed records.
//!
//! Row 0 of every table is the header. Each following row becomes a
//! [`Record`] keyed by header name, with declared coercion rules applied per
//! column name:
//!
//! - columns ending in `_progress` become integers (unparseable → 0);
//! - `is_carry_over` becomes a boolean (case-insensitive `"true"`);
//! - everything else stays text.
//!
//! Coercion never fails. Typed tables implement [`SheetRow`] to declare
//! their column order and convert to and from records.

pub mod range;

use std::borrow::Cow;
use std::collections::HashMap;

pub use range::{A1Range, Grid};

/// Suffix of columns coerced to integers.
pub const PROGRESS_SUFFIX: &str = "_progress";

/// Column coerced to a boolean.
pub const CARRY_OVER_COLUMN: &str = "is_carry_over";

/// One coerced cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl Cell {
    fn coerce(header: &str, raw: &str) -> Self {
        if header.ends_with(PROGRESS_SUFFIX) {
            Self::Int(parse_int(raw))
        } else if header == CARRY_OVER_COLUMN {
            Self::Bool(raw.trim().eq_ignore_ascii_case("true"))
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// Text form of the cell.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Int(n) => Cow::Owned(n.to_string()),
            Self::Bool(b) => Cow::Borrowed(if *b { "TRUE" } else { "FALSE" }),
        }
    }

    /// Integer form; text is parsed with the progress rule.
    #[must_use]
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Int(n) => *n,
            Self::Bool(b) => i64::from(*b),
            Self::Text(s) => parse_int(s),
        }
    }

    /// Boolean form; text is compared with the carry-over rule.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// Lenient integer parse: whole numbers, or decimals truncated toward zero.
/// Anything else is 0.
#[allow(clippy::cast_possible_truncation)]
fn parse_int(raw: &str) -> i64 {
    let s = raw.trim().trim_end_matches('%');
    s.parse::<i64>().unwrap_or_else(|_| {
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map_or(0, |f| f.trunc() as i64)
    })
}

/// One data row keyed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    row: usize,
    fields: HashMap<String, Cell>,
}

impl Record {
    /// Build a record directly; `row` is the 1-based sheet row.
    #[must_use]
    pub fn new(row: usize, fields: HashMap<String, Cell>) -> Self {
        Self { row, fields }
    }

    /// 1-based sheet row this record was read from.
    #[must_use]
    pub const fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.fields.get(name)
    }

    /// Text of `name`, or empty when the column is absent.
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.get(name)
            .map(|c| c.as_text().into_owned())
            .unwrap_or_default()
    }

    /// Text of `name`, or `None` when absent or blank.
    #[must_use]
    pub fn opt_text(&self, name: &str) -> Option<String> {
        Some(self.text(name)).filter(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn int(&self, name: &str) -> i64 {
        self.get(name).map_or(0, Cell::as_int)
    }

    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(Cell::as_bool)
    }
}

/// Convert a raw table (header row first) into records.
///
/// Short rows are padded with empty text. Rows whose cells are all blank
/// are skipped, so a table whose data rows were cleared reads as empty.
/// Columns with a blank header are ignored.
#[must_use]
pub fn parse_table(rows: &[Vec<String>]) -> Vec<Record> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };
    data.iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|(i, row)| {
            let fields = header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.trim().is_empty())
                .map(|(col, name)| {
                    let name = name.trim();
                    let raw = row.get(col).map_or("", String::as_str);
                    (name.to_string(), Cell::coerce(name, raw))
                })
                .collect();
            Record::new(i + 2, fields)
        })
        .collect()
}

/// A table with a declared column-order contract.
pub trait SheetRow: Sized {
    /// Header names, in sheet column order.
    const COLUMNS: &'static [&'static str];

    /// Build from a record; unknown or malformed values recover locally.
    fn from_record(record: &Record) -> Self;

    /// Cells in [`Self::COLUMNS`] order.
    fn to_row(&self) -> Vec<String>;

    /// The header row.
    #[must_use]
    fn header() -> Vec<String> {
        Self::COLUMNS.iter().map(ToString::to_string).collect()
    }

    /// 0-based position of `name` in the declared column order.
    #[must_use]
    fn column(name: &str) -> Option<usize> {
        Self::COLUMNS.iter().position(|c| *c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(ToString::to_string).collect())
            .collect()
    }

    #[test]
    fn empty_table_yields_no_records() {
        assert!(parse_table(&[]).is_empty());
        assert!(parse_table(&strings(&[&["epic_id", "epic_name"]])).is_empty());
    }

    #[test]
    fn progress_columns_coerce_to_int() {
        let rows = strings(&[
            &["epic_id", "ios_progress", "android_progress", "js_progress"],
            &["PROJ-1", "40", "n/a", "72.9"],
        ]);
        let records = parse_table(&rows);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.get("ios_progress"), Some(&Cell::Int(40)));
        assert_eq!(r.get("android_progress"), Some(&Cell::Int(0)));
        assert_eq!(r.int("js_progress"), 72);
        assert_eq!(r.get("epic_id"), Some(&Cell::Text("PROJ-1".into())));
    }

    #[test]
    fn carry_over_coerces_to_bool() {
        let rows = strings(&[
            &["epic_id", "is_carry_over"],
            &["A-1", "TRUE"],
            &["A-2", "yes"],
            &["A-3"],
        ]);
        let records = parse_table(&rows);
        assert!(records[0].flag("is_carry_over"));
        assert!(!records[1].flag("is_carry_over"));
        assert!(!records[2].flag("is_carry_over"));
    }

    #[test]
    fn blank_rows_skipped_but_row_numbers_kept() {
        let rows = strings(&[&["key", "value"], &["", ""], &[], &["schema_version", "1.1.0"]]);
        let records = parse_table(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].row(), 4);
        assert_eq!(records[0].text("value"), "1.1.0");
    }

    #[test]
    fn missing_cells_read_as_empty() {
        let rows = strings(&[&["a", "b", "c"], &["1"]]);
        let r = &parse_table(&rows)[0];
        assert_eq!(r.text("c"), "");
        assert_eq!(r.opt_text("b"), None);
        assert_eq!(r.text("zzz"), "");
    }
}
