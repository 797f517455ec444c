//! In-process workbook.
//!
//! Used by tests and the `memory` backend setting. Besides holding sheets it
//! counts calls per operation and can be scripted to fail the next matching
//! call once, which is how the partial-failure paths of migrations are
//! exercised.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::backend::{BackendError, Rows, SheetBackend};
use crate::sheet::{A1Range, Grid};

/// Backend operations, for call counting and failure scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    BatchRead,
    Read,
    Write,
    Append,
    ListSheets,
    CreateSheet,
}

#[derive(Debug)]
struct ScriptedFailure {
    op: Op,
    /// Substring the addressed range must contain.
    target: String,
    error: BackendError,
}

#[derive(Debug, Default)]
struct State {
    sheets: BTreeMap<String, Grid>,
    calls: HashMap<Op, usize>,
    failures: Vec<ScriptedFailure>,
}

/// A workbook held entirely in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    writable: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty, writable workbook.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            writable: true,
        }
    }

    /// An empty workbook that reports no write credential.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            writable: false,
            ..Self::new()
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder-style seeding of one sheet.
    #[must_use]
    pub fn with_sheet(self, name: &str, rows: &[&[&str]]) -> Self {
        self.seed(name, rows);
        self
    }

    /// Replace the contents of `name`, creating it if needed.
    pub fn seed(&self, name: &str, rows: &[&[&str]]) {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(ToString::to_string).collect())
            .collect();
        self.state()
            .sheets
            .insert(name.to_string(), Grid::from_rows(rows));
    }

    /// Current contents of `name` (trimmed), or `None` if absent.
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<Rows> {
        let range = A1Range {
            sheet: name.to_string(),
            first_col: 0,
            first_row: 0,
            last_col: None,
            last_row: None,
        };
        self.state().sheets.get(name).map(|grid| grid.slice(&range))
    }

    /// Sheet names in sorted order.
    #[must_use]
    pub fn sheet_names(&self) -> Vec<String> {
        self.state().sheets.keys().cloned().collect()
    }

    /// Number of calls of `op` so far.
    #[must_use]
    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of backend calls so far.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Fail the next `op` whose range (or sheet name) contains `target`.
    pub fn fail_next(&self, op: Op, target: &str, error: BackendError) {
        self.state().failures.push(ScriptedFailure {
            op,
            target: target.to_string(),
            error,
        });
    }

    fn enter(&self, op: Op, target: &str) -> Result<std::sync::MutexGuard<'_, State>, BackendError> {
        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(pos) = state
            .failures
            .iter()
            .position(|f| f.op == op && target.contains(&f.target))
        {
            return Err(state.failures.remove(pos).error);
        }
        Ok(state)
    }
}

fn parse(range: &str) -> Result<A1Range, BackendError> {
    A1Range::parse(range).map_err(|_| BackendError::NotFound(range.to_string()))
}

fn grid_mut<'a>(state: &'a mut State, range: &A1Range, raw: &str) -> Result<&'a mut Grid, BackendError> {
    state
        .sheets
        .get_mut(&range.sheet)
        .ok_or_else(|| BackendError::NotFound(raw.to_string()))
}

impl SheetBackend for MemoryBackend {
    fn batch_read(&self, ranges: &[String]) -> Result<Vec<Rows>, BackendError> {
        let state = self.enter(Op::BatchRead, &ranges.join(","))?;
        ranges
            .iter()
            .map(|raw| {
                let range = parse(raw)?;
                state
                    .sheets
                    .get(&range.sheet)
                    .map(|grid| grid.slice(&range))
                    .ok_or_else(|| BackendError::NotFound(raw.clone()))
            })
            .collect()
    }

    fn read_range(&self, range: &str) -> Result<Rows, BackendError> {
        let state = self.enter(Op::Read, range)?;
        let parsed = parse(range)?;
        state
            .sheets
            .get(&parsed.sheet)
            .map(|grid| grid.slice(&parsed))
            .ok_or_else(|| BackendError::NotFound(range.to_string()))
    }

    fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        let mut state = self.enter(Op::Write, range)?;
        let parsed = parse(range)?;
        grid_mut(&mut state, &parsed, range)?.write(&parsed, rows);
        Ok(())
    }

    fn append_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        let mut state = self.enter(Op::Append, range)?;
        let parsed = parse(range)?;
        grid_mut(&mut state, &parsed, range)?.append(&parsed, rows);
        Ok(())
    }

    fn list_sheets(&self) -> Result<Vec<String>, BackendError> {
        let state = self.enter(Op::ListSheets, "")?;
        Ok(state.sheets.keys().cloned().collect())
    }

    fn create_sheet(&self, name: &str) -> Result<(), BackendError> {
        let mut state = self.enter(Op::CreateSheet, name)?;
        if state.sheets.contains_key(name) {
            return Err(BackendError::AlreadyExists(name.to_string()));
        }
        state.sheets.insert(name.to_string(), Grid::new());
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}
