// 🗄️ SQLite Document Store - one table per collection, JSON documents
//
// WAL mode for crash recovery, one transaction per batched write, and an
// events table for the import audit trail.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{BulkWriteSummary, Collection, DocumentVisitor, EntityStore, WriteKind, WriteOp};
use crate::error::StoreError;

/// Rows fetched per cursor page; the connection is released between pages.
const CURSOR_PAGE_SIZE: usize = 256;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::Open)?;
        // Enable WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StoreError::Open)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        setup_database(&conn).map_err(StoreError::Open)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ========================================================================
    // AUDIT TRAIL
    // ========================================================================

    /// Insert event into audit trail
    pub fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let data_json = serde_json::to_string(&event.data)?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )
        .map_err(|source| StoreError::Write {
            collection: "events",
            source,
        })?;

        Ok(())
    }

    /// Get events of one type, newest first
    pub fn get_events(&self, event_type: &str) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock()?;
        let lookup_err = |source| StoreError::Lookup {
            collection: "events",
            source,
        };

        let mut stmt = conn
            .prepare(
                "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
                 FROM events
                 WHERE event_type = ?1
                 ORDER BY id DESC",
            )
            .map_err(lookup_err)?;

        let rows = stmt
            .query_map(params![event_type], |row| {
                let timestamp_str: String = row.get(1)?;
                let data_json: String = row.get(5)?;
                Ok((
                    row.get::<_, String>(0)?,
                    timestamp_str,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    data_json,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(lookup_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(lookup_err)?;

        let mut events = Vec::with_capacity(rows.len());
        for (event_id, timestamp, event_type, entity_type, entity_id, data, actor) in rows {
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Malformed {
                    collection: "events",
                    field: "timestamp",
                    row: event_id.clone(),
                    reason: format!("{:?}: {}", timestamp, e),
                })?;
            events.push(Event {
                event_id,
                timestamp,
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data)?,
                actor,
            });
        }

        Ok(events)
    }
}

/// Event for audit trail: one per completed import run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, data: Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    for collection in Collection::ALL {
        // identifier is deliberately not UNIQUE here: the unique index is
        // created by ensure_index(), once per collection at startup
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    identifier TEXT NOT NULL,
                    document TEXT NOT NULL,
                    modification_ts INTEGER NOT NULL,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
                collection.name()
            ),
            [],
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type)",
        [],
    )?;

    Ok(())
}

impl EntityStore for SqliteStore {
    fn ensure_index(&self, collection: Collection) -> Result<(), StoreError> {
        let table = collection.name();
        let conn = self.lock()?;
        let index_err = |source| StoreError::Index {
            collection: table,
            source,
        };

        conn.execute(
            &format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_identifier ON {table}(identifier)"
            ),
            [],
        )
        .map_err(index_err)?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_modification ON {table}(modification_ts)"
            ),
            [],
        )
        .map_err(index_err)?;

        debug!(collection = table, "ensured identifier index");
        Ok(())
    }

    fn find_one(
        &self,
        collection: Collection,
        identifier: &str,
    ) -> Result<Option<Value>, StoreError> {
        let table = collection.name();
        let conn = self.lock()?;

        let document: Option<String> = conn
            .query_row(
                &format!("SELECT document FROM {table} WHERE identifier = ?1 LIMIT 1"),
                params![identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| StoreError::Lookup {
                collection: table,
                source,
            })?;

        match document {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn bulk_write(
        &self,
        collection: Collection,
        ops: &[WriteOp],
    ) -> Result<BulkWriteSummary, StoreError> {
        let table = collection.name();
        let write_err = |source| StoreError::Write {
            collection: table,
            source,
        };

        // Encode before taking the lock
        let encoded = ops
            .iter()
            .map(|op| Ok((op, serde_json::to_string(&op.document)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(write_err)?;
        let mut summary = BulkWriteSummary::default();

        {
            let mut insert = tx
                .prepare_cached(&format!(
                    "INSERT INTO {table} (identifier, document, modification_ts) VALUES (?1, ?2, ?3)"
                ))
                .map_err(write_err)?;
            let mut update = tx
                .prepare_cached(&format!(
                    "UPDATE {table} SET document = ?2, modification_ts = ?3 WHERE identifier = ?1"
                ))
                .map_err(write_err)?;

            for (op, document) in &encoded {
                let ts = op.modified_at.timestamp_micros();
                match op.kind {
                    WriteKind::Insert => {
                        insert
                            .execute(params![op.identifier, document, ts])
                            .map_err(write_err)?;
                        summary.inserted += 1;
                    }
                    WriteKind::Update => {
                        let changed = update
                            .execute(params![op.identifier, document, ts])
                            .map_err(write_err)?;
                        summary.modified += changed as u64;
                    }
                }
            }
        }

        tx.commit().map_err(write_err)?;
        Ok(summary)
    }

    fn for_each_modified_before(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
        visitor: &mut DocumentVisitor<'_>,
    ) -> Result<usize, StoreError> {
        let table = collection.name();
        let cutoff_ts = cutoff.timestamp_micros();
        let cursor_err = |source| StoreError::Cursor {
            collection: table,
            source,
        };

        let mut last_row_id = 0i64;
        let mut visited = 0usize;

        loop {
            // Keyset pagination: the lock is only held while a page is fetched
            let page: Vec<(i64, String)> = {
                let conn = self.lock()?;
                let mut stmt = conn
                    .prepare_cached(&format!(
                        "SELECT id, document FROM {table}
                         WHERE modification_ts < ?1 AND id > ?2
                         ORDER BY id
                         LIMIT ?3"
                    ))
                    .map_err(cursor_err)?;
                let rows = stmt
                    .query_map(
                        params![cutoff_ts, last_row_id, CURSOR_PAGE_SIZE as i64],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map_err(cursor_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(cursor_err)?;
                rows
            };

            if page.is_empty() {
                break;
            }

            for (row_id, document) in page {
                last_row_id = row_id;
                visitor(serde_json::from_str(&document)?)?;
                visited += 1;
            }
        }

        Ok(visited)
    }

    fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let table = collection.name();
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(|source| StoreError::Lookup {
                collection: table,
                source,
            })?;
        Ok(count as u64)
    }

    fn count_modified_after(
        &self,
        collection: Collection,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let table = collection.name();
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE modification_ts > ?1"),
                params![since.timestamp_micros()],
                |row| row.get(0),
            )
            .map_err(|source| StoreError::Lookup {
                collection: table,
                source,
            })?;
        Ok(count as u64)
    }
}
