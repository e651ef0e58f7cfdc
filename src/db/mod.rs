//! SQLite database module
//!
//! All durable state lives here: users, sessions, logs (with their schema
//! and share token), memberships and entries. Nothing is cached in process.
//!
//! ## Tables
//!
//! - `users` - Identities (username unique case-insensitively, optional email)
//! - `sessions` - Session tokens with expiry
//! - `logs` - Owned logs, schema as JSON, optional share token
//! - `log_shares` - Memberships granted by redeeming a share token
//! - `log_entries` - Entries with an untyped JSON value map
//!
//! Uniqueness constraints are the only concurrency control. A violated
//! constraint surfaces as [`LogbookError::Conflict`].

pub mod schema;
pub mod users;
pub mod sessions;
pub mod logs;
pub mod members;
pub mod entries;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{ffi, Connection};
use tracing::{debug, info};

use crate::error::LogbookError;

/// SQLite database for the logbook
pub struct LogDb {
    conn: Mutex<Connection>,
}

impl LogDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, LogbookError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| LogbookError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| LogbookError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, LogbookError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| LogbookError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, LogbookError> {
        // Cascading deletes depend on this
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| LogbookError::Internal(format!("Failed to enable foreign keys: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, LogbookError>
    where
        F: FnOnce(&Connection) -> Result<T, LogbookError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| LogbookError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, LogbookError>
    where
        F: FnOnce(&mut Connection) -> Result<T, LogbookError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| LogbookError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Cheap liveness check: one trivial query
    pub fn ping(&self) -> Result<(), LogbookError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(query_err)?;
            Ok(())
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, LogbookError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, LogbookError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(query_err)?;
                Ok(n as u64)
            };

            Ok(DbStats {
                user_count: count("users")?,
                log_count: count("logs")?,
                entry_count: count("log_entries")?,
                membership_count: count("log_shares")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub log_count: u64,
    pub entry_count: u64,
    pub membership_count: u64,
}

/// Format a timestamp for storage. Fixed precision keeps text order equal
/// to time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, LogbookError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LogbookError::Internal(format!("Bad stored timestamp {:?}: {}", s, e)))
}

/// Current time truncated to storage precision
pub fn now() -> DateTime<Utc> {
    let ts = Utc::now();
    // round-trip through the stored form so values compare equal after reload
    parse_timestamp(&format_timestamp(&ts)).unwrap_or(ts)
}

/// Case-folded form of a name, used for case-insensitive uniqueness and
/// lookup. Folds all of Unicode, not only ASCII.
pub fn fold_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Map a read failure
pub(crate) fn query_err(e: rusqlite::Error) -> LogbookError {
    LogbookError::Internal(format!("Query failed: {}", e))
}

/// True when the error is a UNIQUE or PRIMARY KEY violation
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Map a write failure, reporting uniqueness violations as `Conflict`
pub(crate) fn write_err(conflict_message: &str, e: rusqlite::Error) -> LogbookError {
    if is_unique_violation(&e) {
        LogbookError::Conflict(conflict_message.to_string())
    } else {
        LogbookError::Internal(format!("Write failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_tables() {
        let db = LogDb::open_in_memory().unwrap();
        db.ping().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.log_count, 0);
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.membership_count, 0);
    }

    #[test]
    fn test_open_file_twice_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logbook.db");
        {
            let db = LogDb::open(&path).unwrap();
            db.with_conn(|conn| {
                users::create_user(conn, "alice", None, "hash", &now())
            })
            .unwrap();
        }
        let db = LogDb::open(&path).unwrap();
        assert_eq!(db.stats().unwrap().user_count, 1);
    }

    #[test]
    fn test_timestamp_text_order_matches_time_order() {
        let early = parse_timestamp("2024-01-02T03:04:05.000001Z").unwrap();
        let late = parse_timestamp("2024-01-02T03:04:05.1Z").unwrap();
        assert!(early < late);
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn test_now_survives_storage_round_trip() {
        let ts = now();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
    }
}
