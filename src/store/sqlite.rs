//! SQLite-backed event store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::{EventRecord, EventStore, RecordId, RecordSummary};
use crate::error::AnalyticsError;

struct Inner {
    conn: Connection,
    /// Running sum of the `size` column; `None` when it must be recomputed.
    total_size: Option<u64>,
}

/// SQLite-backed [`EventStore`].
///
/// A single connection behind a mutex serializes every read and write, which
/// keeps the running size total consistent with the table.
pub struct SqliteEventStore {
    inner: Mutex<Inner>,
}

impl SqliteEventStore {
    /// Opens (creating if needed) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AnalyticsError::storage(format!("Failed to create store directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn)
    }

    /// Opens a store that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, AnalyticsError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AnalyticsError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                total_size: None,
            }),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), AnalyticsError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                size INTEGER NOT NULL,
                payload TEXT
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AnalyticsError> {
        self.inner
            .lock()
            .map_err(|_| AnalyticsError::storage("Event store lock poisoned"))
    }

    /// Returns the number of stored records.
    pub fn count(&self) -> Result<u64, AnalyticsError> {
        let inner = self.lock()?;
        let count: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM pending_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Inserts a row verbatim, bypassing size computation.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, size: u64, payload: Option<&str>) -> RecordId {
        let mut inner = self.inner.lock().unwrap();
        inner
            .conn
            .execute(
                "INSERT INTO pending_events (size, payload) VALUES (?1, ?2)",
                params![size as i64, payload],
            )
            .unwrap();
        inner.total_size = None;
        inner.conn.last_insert_rowid()
    }

    /// Drops the table so later statements fail.
    #[cfg(test)]
    pub(crate) fn break_storage(&self) {
        let inner = self.inner.lock().unwrap();
        inner.conn.execute("DROP TABLE pending_events", []).unwrap();
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, payload: &str) -> Result<RecordId, AnalyticsError> {
        let size = payload.len() as u64;
        let mut inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO pending_events (size, payload) VALUES (?1, ?2)",
            params![size as i64, payload],
        )?;
        let id = inner.conn.last_insert_rowid();
        if let Some(total) = inner.total_size.as_mut() {
            *total += size;
        }
        Ok(id)
    }

    fn query_oldest(&self, limit: usize) -> Result<Vec<RecordSummary>, AnalyticsError> {
        let inner = self.lock()?;
        let mut stmt = inner
            .conn
            .prepare_cached("SELECT id, size FROM pending_events ORDER BY id ASC LIMIT ?1")?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(RecordSummary {
                id: row.get(0)?,
                size: row.get::<_, i64>(1)?.max(0) as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn read_after(&self, after: RecordId, limit: usize) -> Result<Vec<EventRecord>, AnalyticsError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare_cached(
            "SELECT id, size, payload FROM pending_events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after, limit as i64], |row| {
            Ok(EventRecord {
                id: row.get(0)?,
                size: row.get::<_, i64>(1)?.max(0) as u64,
                payload: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete(&self, id: RecordId, known_size: Option<u64>) -> Result<usize, AnalyticsError> {
        let mut inner = self.lock()?;
        match inner
            .conn
            .execute("DELETE FROM pending_events WHERE id = ?1", [id])
        {
            Ok(rows) => {
                if rows > 0 {
                    inner.total_size = match (known_size, inner.total_size) {
                        (Some(size), Some(total)) => Some(total.saturating_sub(size)),
                        _ => None,
                    };
                }
                Ok(rows)
            }
            Err(e) => {
                inner.total_size = None;
                Err(e.into())
            }
        }
    }

    fn total_pending_size(&self) -> Result<u64, AnalyticsError> {
        let mut inner = self.lock()?;
        if let Some(total) = inner.total_size {
            return Ok(total);
        }
        let total: Option<i64> = inner
            .conn
            .query_row("SELECT SUM(size) FROM pending_events", [], |row| row.get(0))
            .optional()?
            .flatten();
        let total = total.unwrap_or(0).max(0) as u64;
        inner.total_size = Some(total);
        Ok(total)
    }
}
