//! A1-notation ranges and an in-memory cell grid.
//!
//! Supported forms: `Sheet` (whole sheet), `Sheet!A:Z` (column span),
//! `Sheet!A2:F` (open-ended rows), `Sheet!A1:C4` (box) and `Sheet!L1`
//! (single cell). Sheet names containing anything other than ASCII
//! alphanumerics or `_` are single-quoted.

use std::fmt;

/// Widest column span read by whole-sheet ranges (`A:Z`).
pub const LAST_COLUMN: usize = 25;

/// Column letters for a 0-based column index (`0 → A`, `26 → AA`).
#[must_use]
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + u8::try_from(rem).unwrap_or(0));
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// 0-based column index for column letters, or `None` if `letters` is not
/// a non-empty run of ASCII uppercase letters.
#[must_use]
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let n = letters
        .bytes()
        .try_fold(0usize, |acc, b| acc.checked_mul(26)?.checked_add(usize::from(b - b'A') + 1))?;
    Some(n - 1)
}

fn quote_sheet(sheet: &str) -> String {
    if !sheet.is_empty() && sheet.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// `Sheet!A:Z`: every used row of the sheet.
#[must_use]
pub fn whole_sheet(sheet: &str) -> String {
    columns(sheet, 0, LAST_COLUMN)
}

/// `Sheet!{first}:{last}` column span.
#[must_use]
pub fn columns(sheet: &str, first: usize, last: usize) -> String {
    format!(
        "{}!{}:{}",
        quote_sheet(sheet),
        column_letter(first),
        column_letter(last)
    )
}

/// A single row of `width` columns at 1-based sheet row `row`.
#[must_use]
pub fn row_span(sheet: &str, row: usize, width: usize) -> String {
    box_range(sheet, row, row, width)
}

/// Rows `first..=last` (1-based) over the first `width` columns.
#[must_use]
pub fn box_range(sheet: &str, first: usize, last: usize, width: usize) -> String {
    format!(
        "{}!A{first}:{}{last}",
        quote_sheet(sheet),
        column_letter(width.saturating_sub(1))
    )
}

/// A single cell at 0-based column `col`, 1-based row `row`.
#[must_use]
pub fn cell(sheet: &str, col: usize, row: usize) -> String {
    format!("{}!{}{row}", quote_sheet(sheet), column_letter(col))
}

/// Error returned for malformed A1 references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRangeError(pub String);

impl fmt::Display for ParseRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to parse range: {}", self.0)
    }
}

impl std::error::Error for ParseRangeError {}

/// A parsed A1 range. Rows and columns are 0-based; `None` bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub first_col: usize,
    pub first_row: usize,
    pub last_col: Option<usize>,
    pub last_row: Option<usize>,
}

/// Split `A12` into (`Some(0)`, `Some(11)`); either half may be absent.
fn parse_cell_ref(raw: &str) -> Option<(Option<usize>, Option<usize>)> {
    let split = raw.find(|c: char| c.is_ascii_digit()).unwrap_or(raw.len());
    let (letters, digits) = raw.split_at(split);
    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let n: usize = digits.parse().ok()?;
        Some(n.checked_sub(1)?)
    };
    if col.is_none() && row.is_none() {
        return None;
    }
    Some((col, row))
}

impl A1Range {
    /// Parse an A1 range.
    ///
    /// # Errors
    ///
    /// Returns [`ParseRangeError`] for empty sheet names or malformed cell
    /// references.
    pub fn parse(raw: &str) -> Result<Self, ParseRangeError> {
        let err = || ParseRangeError(raw.to_string());
        let (sheet, reference) = if let Some(rest) = raw.strip_prefix('\'') {
            let close = rest
                .char_indices()
                .scan(false, |escaped, (i, c)| {
                    if *escaped {
                        *escaped = false;
                        return Some(None);
                    }
                    if c == '\'' {
                        if rest[i + 1..].starts_with('\'') {
                            *escaped = true;
                            return Some(None);
                        }
                        return Some(Some(i));
                    }
                    Some(None)
                })
                .flatten()
                .next()
                .ok_or_else(err)?;
            let sheet = rest[..close].replace("''", "'");
            let tail = &rest[close + 1..];
            let reference = match tail.strip_prefix('!') {
                Some(reference) => Some(reference),
                None if tail.is_empty() => None,
                None => return Err(err()),
            };
            (sheet, reference)
        } else {
            match raw.rsplit_once('!') {
                Some((sheet, reference)) => (sheet.to_string(), Some(reference)),
                None => (raw.to_string(), None),
            }
        };
        if sheet.is_empty() {
            return Err(err());
        }

        let Some(reference) = reference else {
            return Ok(Self {
                sheet,
                first_col: 0,
                first_row: 0,
                last_col: None,
                last_row: None,
            });
        };

        let (start, end) = match reference.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (reference, None),
        };
        let (start_col, start_row) = parse_cell_ref(start).ok_or_else(err)?;
        let (last_col, last_row) = match end {
            Some(end) => parse_cell_ref(end).ok_or_else(err)?,
            None => (start_col, start_row),
        };

        let range = Self {
            sheet,
            first_col: start_col.unwrap_or(0),
            first_row: start_row.unwrap_or(0),
            last_col,
            last_row,
        };
        if range.last_col.is_some_and(|c| c < range.first_col)
            || range.last_row.is_some_and(|r| r < range.first_row)
        {
            return Err(err());
        }
        Ok(range)
    }

    fn contains_col(&self, col: usize) -> bool {
        col >= self.first_col && self.last_col.is_none_or(|last| col <= last)
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}{}",
            quote_sheet(&self.sheet),
            column_letter(self.first_col),
            self.first_row + 1
        )?;
        if self.last_col.is_some() || self.last_row.is_some() {
            f.write_str(":")?;
            if let Some(col) = self.last_col {
                f.write_str(&column_letter(col))?;
            }
            if let Some(row) = self.last_row {
                write!(f, "{}", row + 1)?;
            }
        }
        Ok(())
    }
}

/// A sheet's cells held in memory, row-major.
///
/// Shared by the in-process and sqlite backends so both follow the same
/// read-trimming and append rules as the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(row, col, value)` triples (0-based).
    pub fn from_cells(cells: impl IntoIterator<Item = (usize, usize, String)>) -> Self {
        let mut grid = Self::new();
        for (row, col, value) in cells {
            grid.set(row, col, value);
        }
        grid
    }

    #[must_use]
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Set one cell, growing the grid as needed.
    pub fn set(&mut self, row: usize, col: usize, value: String) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value;
    }

    /// Non-empty cells as `(row, col, value)` triples.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &str)> {
        self.rows.iter().enumerate().flat_map(|(r, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(move |(c, v)| (r, c, v.as_str()))
        })
    }

    /// Values inside `range`, with trailing empty cells and rows trimmed.
    #[must_use]
    pub fn slice(&self, range: &A1Range) -> Vec<Vec<String>> {
        let end_row = range
            .last_row
            .map_or(self.rows.len(), |last| (last + 1).min(self.rows.len()));
        let mut out: Vec<Vec<String>> = (range.first_row..end_row)
            .map(|r| {
                let cells = &self.rows[r];
                let end_col = range
                    .last_col
                    .map_or(cells.len(), |last| (last + 1).min(cells.len()));
                let mut row: Vec<String> = cells
                    .get(range.first_col..end_col)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                while row.last().is_some_and(String::is_empty) {
                    row.pop();
                }
                row
            })
            .collect();
        while out.last().is_some_and(Vec::is_empty) {
            out.pop();
        }
        out
    }

    /// Write `values` with their top-left at the range origin.
    pub fn write(&mut self, range: &A1Range, values: &[Vec<String>]) {
        for (dr, row) in values.iter().enumerate() {
            for (dc, value) in row.iter().enumerate() {
                self.set(range.first_row + dr, range.first_col + dc, value.clone());
            }
        }
    }

    /// First row after the last row holding data within the range's columns.
    #[must_use]
    pub fn next_append_row(&self, range: &A1Range) -> usize {
        let last_used = self.rows.iter().enumerate().rev().find_map(|(r, cells)| {
            cells
                .iter()
                .enumerate()
                .any(|(c, v)| range.contains_col(c) && !v.is_empty())
                .then_some(r)
        });
        last_used.map_or(range.first_row, |r| (r + 1).max(range.first_row))
    }

    /// Append `values` below existing data.
    pub fn append(&mut self, range: &A1Range, values: &[Vec<String>]) {
        let start = self.next_append_row(range);
        let origin = A1Range {
            first_row: start,
            ..range.clone()
        };
        self.write(&origin, values);
    }
}
