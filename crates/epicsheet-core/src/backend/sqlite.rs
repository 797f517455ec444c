//! Local workbook stored in SQLite.
//!
//! Cells live in one `cells(sheet, row, col, value)` table keyed by
//! position; empty cells are not stored. Sheet order is kept in `sheets`.
//! Range semantics (trimming, append position) follow the in-memory
//! [`Grid`], which is loaded per sheet on demand.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params, types::Type};
use tracing::debug;

use crate::backend::{BackendError, Rows, SheetBackend};
use crate::sheet::{A1Range, Grid};

/// Busy timeout for workbook connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Latest workbook schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATION_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS sheets (
    name     TEXT PRIMARY KEY,
    position INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS cells (
    sheet TEXT NOT NULL REFERENCES sheets(name) ON DELETE CASCADE,
    row   INTEGER NOT NULL,
    col   INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (sheet, row, col)
);
";

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

fn sql_err(err: rusqlite::Error) -> BackendError {
    BackendError::Transport(format!("sqlite: {err}"))
}

fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }
    Ok(current)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// A workbook persisted in a SQLite file.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the workbook at `path` and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the file cannot be opened or
    /// migrated.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackendError::Transport(format!("create workbook directory {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::from_connection(conn)
    }

    /// A throwaway workbook in memory.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if SQLite cannot be initialised.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::from_connection(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, BackendError> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(sql_err)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT).map_err(sql_err)?;
        let version = migrate(&mut conn).map_err(sql_err)?;
        debug!(version, "sqlite workbook ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schema version recorded in `PRAGMA user_version`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the pragma cannot be read.
    pub fn schema_version(&self) -> Result<u32, BackendError> {
        current_schema_version(&self.conn()).map_err(sql_err)
    }
}

fn sheet_exists(conn: &Connection, sheet: &str) -> Result<bool, BackendError> {
    conn.query_row("SELECT 1 FROM sheets WHERE name = ?1", [sheet], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(sql_err)
}

fn load_grid(conn: &Connection, sheet: &str) -> Result<Grid, BackendError> {
    let mut stmt = conn
        .prepare_cached("SELECT row, col, value FROM cells WHERE sheet = ?1")
        .map_err(sql_err)?;
    let cells = stmt
        .query_map([sheet], |row| {
            let r: i64 = row.get(0)?;
            let c: i64 = row.get(1)?;
            let value: String = row.get(2)?;
            Ok((
                usize::try_from(r).unwrap_or(0),
                usize::try_from(c).unwrap_or(0),
                value,
            ))
        })
        .map_err(sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql_err)?;
    Ok(Grid::from_cells(cells))
}

fn load_existing(conn: &Connection, range: &A1Range, raw: &str) -> Result<Grid, BackendError> {
    if !sheet_exists(conn, &range.sheet)? {
        return Err(BackendError::NotFound(raw.to_string()));
    }
    load_grid(conn, &range.sheet)
}

fn store_cells(
    conn: &mut Connection,
    sheet: &str,
    first_row: usize,
    first_col: usize,
    rows: &[Vec<String>],
) -> Result<(), BackendError> {
    let tx = conn.transaction().map_err(sql_err)?;
    {
        let mut upsert = tx
            .prepare_cached(
                "INSERT INTO cells (sheet, row, col, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(sheet, row, col) DO UPDATE SET value = excluded.value",
            )
            .map_err(sql_err)?;
        let mut delete = tx
            .prepare_cached("DELETE FROM cells WHERE sheet = ?1 AND row = ?2 AND col = ?3")
            .map_err(sql_err)?;
        for (dr, row) in rows.iter().enumerate() {
            for (dc, value) in row.iter().enumerate() {
                let r = to_i64(first_row + dr);
                let c = to_i64(first_col + dc);
                if value.is_empty() {
                    delete.execute(params![sheet, r, c]).map_err(sql_err)?;
                } else {
                    upsert.execute(params![sheet, r, c, value]).map_err(sql_err)?;
                }
            }
        }
    }
    tx.commit().map_err(sql_err)
}

fn parse(range: &str) -> Result<A1Range, BackendError> {
    A1Range::parse(range).map_err(|_| BackendError::NotFound(range.to_string()))
}

impl SheetBackend for SqliteBackend {
    fn read_range(&self, range: &str) -> Result<Rows, BackendError> {
        let parsed = parse(range)?;
        let conn = self.conn();
        Ok(load_existing(&conn, &parsed, range)?.slice(&parsed))
    }

    fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        let parsed = parse(range)?;
        let mut conn = self.conn();
        if !sheet_exists(&conn, &parsed.sheet)? {
            return Err(BackendError::NotFound(range.to_string()));
        }
        store_cells(&mut conn, &parsed.sheet, parsed.first_row, parsed.first_col, rows)
    }

    fn append_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        let parsed = parse(range)?;
        let mut conn = self.conn();
        let start = load_existing(&conn, &parsed, range)?.next_append_row(&parsed);
        store_cells(&mut conn, &parsed.sheet, start, parsed.first_col, rows)
    }

    fn list_sheets(&self) -> Result<Vec<String>, BackendError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached("SELECT name FROM sheets ORDER BY position")
            .map_err(sql_err)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(sql_err)?;
        Ok(names)
    }

    fn create_sheet(&self, name: &str) -> Result<(), BackendError> {
        let conn = self.conn();
        if sheet_exists(&conn, name)? {
            return Err(BackendError::AlreadyExists(name.to_string()));
        }
        conn.execute(
            "INSERT INTO sheets (name, position)
             VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM sheets))",
            [name],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(rows: &[&[&str]]) -> Rows {
        rows.iter()
            .map(|r| r.iter().map(ToString::to_string).collect())
            .collect()
    }

    #[test]
    fn open_runs_migrations() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = SqliteBackend::open(&dir.path().join("book.sqlite3")).expect("open");
        assert_eq!(backend.schema_version().expect("version"), LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("book.sqlite3");
        {
            let backend = SqliteBackend::open(&path).expect("open");
            backend.create_sheet("Epics").expect("create");
            backend
                .write_range("Epics!A1:B1", &strings(&[&["epic_id", "epic_name"]]))
                .expect("write");
            backend
                .append_range("Epics!A:B", &strings(&[&["PROJ-1", "Login"]]))
                .expect("append");
        }
        let backend = SqliteBackend::open(&path).expect("reopen");
        assert_eq!(
            backend.read_range("Epics!A:Z").expect("read"),
            strings(&[&["epic_id", "epic_name"], &["PROJ-1", "Login"]])
        );
    }

    #[test]
    fn missing_sheet_is_not_found_and_empty_sheet_is_empty() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        backend.create_sheet("Empty").expect("create");
        assert_eq!(backend.read_range("Empty!A:Z"), Ok(vec![]));
        assert!(matches!(
            backend.read_range("Missing!A:Z"),
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.write_range("Missing!A1", &strings(&[&["x"]])),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn sheets_listed_in_creation_order() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        for name in ["Epics", "Epic_Status", "Metadata"] {
            backend.create_sheet(name).expect("create");
        }
        assert!(matches!(
            backend.create_sheet("Epics"),
            Err(BackendError::AlreadyExists(_))
        ));
        assert_eq!(
            backend.list_sheets().expect("list"),
            ["Epics", "Epic_Status", "Metadata"]
        );
    }

    #[test]
    fn blank_writes_clear_cells() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        backend.create_sheet("Log").expect("create");
        backend
            .write_range("Log!A1:A3", &strings(&[&["h"], &["a"], &["b"]]))
            .expect("write");
        backend
            .write_range("Log!A2:A3", &strings(&[&[""], &[""]]))
            .expect("clear");
        assert_eq!(backend.read_range("Log!A:Z").expect("read"), strings(&[&["h"]]));
    }
}
