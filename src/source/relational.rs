//! Relational backend over an SQLite database
//!
//! The first table enumerated (other than the description table) is the data
//! table. Columns are classified from their declared types; the optional
//! description table mirrors the data table's columns and holds the units
//! row followed by legend rows.
//!
//! Rows are read in `rowid` order, one bounded batch per query. Each batch
//! resumes after the last rowid seen, so a cursor never holds more than
//! `scan_batch` rows and no statement outlives a call to `next()`. Tables
//! declared `WITHOUT ROWID` cannot be scanned.

use super::{build_description, CursorError, CursorResult, RecordSource, SourceKind};
use crate::config::RelationalConfig;
use crate::types::{Record, SourceDescription, VariableKind};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, Row};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const LIST_TABLES: &str = "SELECT name FROM sqlite_master \
     WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid";

/// Cursor backend over the first table of an SQLite database
///
/// Copies share the connection; it is closed when the last copy closes.
pub struct RelationalSource {
    path: PathBuf,
    table: String,
    description: SourceDescription,
    conn: Option<Arc<Mutex<Connection>>>,
    batch: usize,
    /// Rowid of the last row fetched, `None` before the first batch
    after: Option<i64>,
    buffer: VecDeque<Record>,
    done: bool,
    dropped: u64,
}

impl std::fmt::Debug for RelationalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalSource")
            .field("path", &self.path)
            .field("table", &self.table)
            .field("open", &self.conn.is_some())
            .field("after", &self.after)
            .finish()
    }
}

impl RelationalSource {
    /// Open a database read-only and describe its data table
    pub fn open(path: impl AsRef<Path>, config: &RelationalConfig) -> CursorResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let tables = list_tables(&conn)?;
        let table = tables
            .iter()
            .find(|t| **t != config.descr_table)
            .cloned()
            .ok_or_else(|| CursorError::Description("database has no data table".to_string()))?;

        let (labels, kinds) = describe_table(&conn, &table, config)?;
        let descr_rows = if tables.contains(&config.descr_table) {
            read_descr_table(&conn, &config.descr_table)?
        } else {
            Vec::new()
        };
        let description = build_description(&labels, &kinds, &descr_rows)?;

        tracing::info!(
            "Opened relational source {} table {:?} with {} columns",
            path.display(),
            table,
            description.arity()
        );

        Ok(Self {
            path,
            table,
            description,
            conn: Some(Arc::new(Mutex::new(conn))),
            batch: config.scan_batch(),
            after: None,
            buffer: VecDeque::new(),
            done: false,
            dropped: 0,
        })
    }

    /// Name of the data table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows dropped because they could not be coerced
    pub fn dropped_rows(&self) -> u64 {
        self.dropped
    }

    fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
        conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the next batch of rows after the last rowid seen
    fn fetch_batch(&mut self) -> CursorResult<()> {
        let conn = self.conn.as_ref().ok_or(CursorError::SourceClosed)?;
        let conn = Self::lock(conn);
        let arity = self.description.arity();
        let table = quote_ident(&self.table);
        let limit = i64::try_from(self.batch).unwrap_or(i64::MAX);

        let mut stmt;
        let mut rows = match self.after {
            None => {
                stmt = conn.prepare_cached(&format!(
                    "SELECT rowid, * FROM {} ORDER BY rowid LIMIT ?1",
                    table
                ))?;
                stmt.query(params![limit])?
            }
            Some(after) => {
                stmt = conn.prepare_cached(&format!(
                    "SELECT rowid, * FROM {} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
                    table
                ))?;
                stmt.query(params![after, limit])?
            }
        };

        let mut fetched = 0usize;
        while let Some(row) = rows.next()? {
            fetched += 1;
            self.after = Some(row.get::<_, i64>(0)?);
            match coerce_row(row, 1, arity)? {
                Some(record) => self.buffer.push_back(record),
                None => self.dropped += 1,
            }
        }

        if fetched < self.batch {
            self.done = true;
            tracing::debug!("Scanned {:?}: {} rows dropped", self.table, self.dropped);
        }
        Ok(())
    }

    fn reset_scan(&mut self) {
        self.after = None;
        self.buffer.clear();
        self.done = false;
        self.dropped = 0;
    }
}

impl RecordSource for RelationalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Relational
    }

    fn description(&self) -> &SourceDescription {
        &self.description
    }

    fn next_record(&mut self) -> CursorResult<Record> {
        if self.conn.is_none() {
            return Err(CursorError::SourceClosed);
        }
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(record);
            }
            if self.done {
                return Err(CursorError::EndOfSource);
            }
            self.fetch_batch()?;
        }
    }

    fn rewind(&mut self) -> CursorResult<()> {
        if self.conn.is_none() {
            return Err(CursorError::SourceClosed);
        }
        self.reset_scan();
        Ok(())
    }

    fn try_copy(&self) -> CursorResult<Box<dyn RecordSource + Send>> {
        let conn = self.conn.clone().ok_or(CursorError::SourceClosed)?;
        Ok(Box::new(Self {
            path: self.path.clone(),
            table: self.table.clone(),
            description: self.description.clone(),
            conn: Some(conn),
            batch: self.batch,
            after: None,
            buffer: VecDeque::new(),
            done: false,
            dropped: 0,
        }))
    }

    fn close(&mut self) -> CursorResult<()> {
        self.reset_scan();
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(conn) {
            Ok(conn) => {
                let conn = conn.into_inner().unwrap_or_else(|p| p.into_inner());
                conn.close().map_err(|(_, e)| CursorError::Sql(e))?;
                tracing::debug!("Closed database {}", self.path.display());
            }
            Err(_) => {
                tracing::debug!("Released shared connection to {}", self.path.display());
            }
        }
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn list_tables(conn: &Connection) -> CursorResult<Vec<String>> {
    let mut stmt = conn.prepare(LIST_TABLES)?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tables)
}

fn describe_table(
    conn: &Connection,
    table: &str,
    config: &RelationalConfig,
) -> CursorResult<(Vec<String>, Vec<VariableKind>)> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns
        .into_iter()
        .map(|(name, declared)| {
            let kind = if config.is_numeric_type(declared.as_deref().unwrap_or("")) {
                VariableKind::Numeric
            } else {
                VariableKind::Categorical
            };
            (name, kind)
        })
        .unzip())
}

fn read_descr_table(conn: &Connection, table: &str) -> CursorResult<Vec<Vec<String>>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    let width = stmt.column_count();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(match row.get_ref(i)? {
                ValueRef::Null | ValueRef::Blob(_) => String::new(),
                ValueRef::Integer(v) => v.to_string(),
                ValueRef::Real(v) => v.to_string(),
                ValueRef::Text(t) => String::from_utf8_lossy(t).trim().to_string(),
            });
        }
        out.push(cells);
    }
    Ok(out)
}

/// Coerce columns `first..first + arity` of a row, `None` if any is unusable
fn coerce_row(row: &Row<'_>, first: usize, arity: usize) -> CursorResult<Option<Record>> {
    let mut values = Vec::with_capacity(arity);
    for i in first..first + arity {
        let value = match row.get_ref(i)? {
            ValueRef::Integer(v) => v as f64,
            ValueRef::Real(v) => v,
            ValueRef::Text(t) => match std::str::from_utf8(t).ok().and_then(|s| s.trim().parse().ok()) {
                Some(v) => v,
                None => return Ok(None),
            },
            ValueRef::Null | ValueRef::Blob(_) => return Ok(None),
        };
        values.push(value);
    }
    Ok(Some(Record::new(values)))
}
