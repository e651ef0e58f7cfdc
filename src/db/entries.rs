//! Entry rows
//!
//! Values are stored as the caller's JSON object, untyped. Entries are
//! never rewritten when their log's schema changes.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, query_err, write_err};
use crate::error::LogbookError;

/// Entry row joined with the author's username
#[derive(Debug, Clone)]
pub struct EntryRow {
    pub id: String,
    pub log_id: String,
    pub user_id: String,
    pub username: String,
    pub fields: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct RawEntry {
    id: String,
    log_id: String,
    user_id: String,
    username: String,
    fields_json: String,
    occurred_at: String,
    created_at: String,
    updated_at: String,
}

impl RawEntry {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            log_id: row.get("log_id")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            fields_json: row.get("fields_json")?,
            occurred_at: row.get("occurred_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn decode(self) -> Result<EntryRow, LogbookError> {
        let fields = serde_json::from_str(&self.fields_json)
            .map_err(|e| LogbookError::Internal(format!("Stored entry values are unreadable: {}", e)))?;
        Ok(EntryRow {
            fields,
            occurred_at: parse_timestamp(&self.occurred_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            log_id: self.log_id,
            user_id: self.user_id,
            username: self.username,
        })
    }
}

const ENTRY_SELECT: &str = "SELECT e.id, e.log_id, e.user_id, u.username, e.fields_json,
            e.occurred_at, e.created_at, e.updated_at
     FROM log_entries e
     JOIN users u ON e.user_id = u.id";

fn encode_fields(fields: &Map<String, Value>) -> Result<String, LogbookError> {
    serde_json::to_string(fields)
        .map_err(|e| LogbookError::Internal(format!("Failed to encode entry values: {}", e)))
}

/// Input for creating an entry
#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    pub log_id: &'a str,
    pub user_id: &'a str,
    pub fields: &'a Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

pub fn create_entry(
    conn: &Connection,
    entry: NewEntry<'_>,
    now: &DateTime<Utc>,
) -> Result<EntryRow, LogbookError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO log_entries (id, log_id, user_id, fields_json, occurred_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            entry.log_id,
            entry.user_id,
            encode_fields(entry.fields)?,
            format_timestamp(&entry.occurred_at),
            format_timestamp(now),
        ],
    )
    .map_err(|e| write_err("entry id collision", e))?;

    get_entry(conn, entry.log_id, &id)?
        .ok_or_else(|| LogbookError::Internal(format!("Entry {} vanished after insert", id)))
}

/// Get an entry, only if it belongs to `log_id`
pub fn get_entry(conn: &Connection, log_id: &str, id: &str) -> Result<Option<EntryRow>, LogbookError> {
    let raw = conn
        .query_row(
            &format!("{} WHERE e.id = ?1 AND e.log_id = ?2", ENTRY_SELECT),
            params![id, log_id],
            RawEntry::from_row,
        )
        .optional()
        .map_err(query_err)?;
    raw.map(RawEntry::decode).transpose()
}

/// Entries of a log, most recent `occurred_at` first
pub fn list_entries(conn: &Connection, log_id: &str) -> Result<Vec<EntryRow>, LogbookError> {
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE e.log_id = ? ORDER BY e.occurred_at DESC, e.created_at DESC",
            ENTRY_SELECT
        ))
        .map_err(|e| LogbookError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![log_id], RawEntry::from_row)
        .map_err(query_err)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.map_err(query_err)?.decode()?);
    }
    Ok(entries)
}

/// Replace an entry's values and occurrence time.
/// Returns `None` when the entry is not in `log_id`.
pub fn update_entry(
    conn: &Connection,
    log_id: &str,
    id: &str,
    fields: &Map<String, Value>,
    occurred_at: &DateTime<Utc>,
    now: &DateTime<Utc>,
) -> Result<Option<EntryRow>, LogbookError> {
    let changed = conn
        .execute(
            "UPDATE log_entries SET fields_json = ?1, occurred_at = ?2, updated_at = ?3
             WHERE id = ?4 AND log_id = ?5",
            params![
                encode_fields(fields)?,
                format_timestamp(occurred_at),
                format_timestamp(now),
                id,
                log_id
            ],
        )
        .map_err(query_err)?;

    if changed == 0 {
        return Ok(None);
    }
    get_entry(conn, log_id, id)
}

pub fn delete_entry(conn: &Connection, log_id: &str, id: &str) -> Result<bool, LogbookError> {
    let deleted = conn
        .execute(
            "DELETE FROM log_entries WHERE id = ?1 AND log_id = ?2",
            params![id, log_id],
        )
        .map_err(query_err)?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{logs, now, users, LogDb};
    use crate::validation::Schema;
    use serde_json::json;

    #[test]
    fn test_deleting_log_cascades_to_entries() {
        let db = LogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let alice = users::create_user(conn, "alice", None, "h", &now())?;
            let log = logs::create_log(conn, &alice.id, "Water", &Schema::empty(), &now())?;
            let fields = Map::new();
            create_entry(
                conn,
                NewEntry { log_id: &log.id, user_id: &alice.id, fields: &fields, occurred_at: now() },
                &now(),
            )?;
            assert_eq!(list_entries(conn, &log.id)?.len(), 1);

            assert!(logs::delete_log(conn, &log.id, &alice.id)?);
            assert!(list_entries(conn, &log.id)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_orders_by_occurred_at_desc() {
        let db = LogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let alice = users::create_user(conn, "alice", None, "h", &now())?;
            let log = logs::create_log(conn, &alice.id, "Water", &Schema::empty(), &now())?;

            for (label, ts) in [
                ("middle", "2024-03-02T10:00:00Z"),
                ("oldest", "2024-03-01T10:00:00Z"),
                ("newest", "2024-03-03T10:00:00Z"),
            ] {
                let fields = json!({ "label": label }).as_object().cloned().unwrap();
                create_entry(
                    conn,
                    NewEntry {
                        log_id: &log.id,
                        user_id: &alice.id,
                        fields: &fields,
                        occurred_at: parse_timestamp(ts)?,
                    },
                    &now(),
                )?;
            }

            let labels: Vec<_> = list_entries(conn, &log.id)?
                .into_iter()
                .map(|e| e.fields["label"].as_str().unwrap_or_default().to_string())
                .collect();
            assert_eq!(labels, vec!["newest", "middle", "oldest"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_entry_scoped_to_log() {
        let db = LogDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let alice = users::create_user(conn, "alice", None, "h", &now())?;
            let water = logs::create_log(conn, &alice.id, "Water", &Schema::empty(), &now())?;
            let sleep = logs::create_log(conn, &alice.id, "Sleep", &Schema::empty(), &now())?;
            let fields = Map::new();
            let entry = create_entry(
                conn,
                NewEntry { log_id: &water.id, user_id: &alice.id, fields: &fields, occurred_at: now() },
                &now(),
            )?;

            assert!(get_entry(conn, &sleep.id, &entry.id)?.is_none());
            assert!(update_entry(conn, &sleep.id, &entry.id, &fields, &now(), &now())?.is_none());
            assert!(!delete_entry(conn, &sleep.id, &entry.id)?);
            assert!(delete_entry(conn, &water.id, &entry.id)?);
            Ok(())
        })
        .unwrap();
    }
}
