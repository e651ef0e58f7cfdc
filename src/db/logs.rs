//! Log rows: owner, name, schema and share token

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{fold_key, format_timestamp, parse_timestamp, query_err, write_err};
use crate::error::LogbookError;
use crate::validation::Schema;

const DUPLICATE_NAME: &str = "a log with that name already exists";

/// Log row from database
#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub schema: Schema,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw column values, decoded outside the rusqlite row callback
struct RawLog {
    id: String,
    owner_id: String,
    name: String,
    fields_json: String,
    share_token: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawLog {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("user_id")?,
            name: row.get("name")?,
            fields_json: row.get("fields_json")?,
            share_token: row.get("share_token")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn decode(self) -> Result<LogRow, LogbookError> {
        Ok(LogRow {
            schema: decode_schema(&self.fields_json)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            share_token: self.share_token,
        })
    }
}

fn decode_schema(json: &str) -> Result<Schema, LogbookError> {
    Schema::from_json(json)
        .map_err(|e| LogbookError::Internal(format!("Stored schema is unreadable: {}", e)))
}

fn encode_schema(schema: &Schema) -> Result<String, LogbookError> {
    schema
        .to_json()
        .map_err(|e| LogbookError::Internal(format!("Failed to encode schema: {}", e)))
}

const LOG_COLUMNS: &str = "id, user_id, name, fields_json, share_token, created_at, updated_at";

/// A log as seen by one identity
#[derive(Debug, Clone)]
pub struct ListedLog {
    pub log: LogRow,
    pub is_owner: bool,
}

/// A log resolved from a share token
#[derive(Debug, Clone)]
pub struct SharedLogRow {
    pub log_id: String,
    pub log_name: String,
    pub owner_id: String,
    pub owner_username: String,
}

pub fn create_log(
    conn: &Connection,
    owner_id: &str,
    name: &str,
    schema: &Schema,
    now: &DateTime<Utc>,
) -> Result<LogRow, LogbookError> {
    let id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO logs (id, user_id, name, name_key, fields_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            owner_id,
            name,
            fold_key(name),
            encode_schema(schema)?,
            format_timestamp(now)
        ],
    )
    .map_err(|e| write_err(DUPLICATE_NAME, e))?;

    Ok(LogRow {
        id,
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        schema: schema.clone(),
        share_token: None,
        created_at: *now,
        updated_at: *now,
    })
}

/// Get a log by id, not scoped to any identity
pub fn get_log(conn: &Connection, id: &str) -> Result<Option<LogRow>, LogbookError> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM logs WHERE id = ?", LOG_COLUMNS),
            params![id],
            RawLog::from_row,
        )
        .optional()
        .map_err(query_err)?;
    raw.map(RawLog::decode).transpose()
}

/// Owner id and current schema of a log
pub fn get_owner_and_schema(
    conn: &Connection,
    id: &str,
) -> Result<Option<(String, Schema)>, LogbookError> {
    let raw: Option<(String, String)> = conn
        .query_row(
            "SELECT user_id, fields_json FROM logs WHERE id = ?",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(query_err)?;

    match raw {
        Some((owner_id, fields_json)) => Ok(Some((owner_id, decode_schema(&fields_json)?))),
        None => Ok(None),
    }
}

/// Logs owned by or shared with a user, ordered by name ignoring case
pub fn list_logs_for_user(conn: &Connection, user_id: &str) -> Result<Vec<ListedLog>, LogbookError> {
    let mut stmt = conn
        .prepare(
            "SELECT l.id, l.user_id, l.name, l.fields_json, l.share_token, l.created_at, l.updated_at,
                    l.name_key, 1 AS is_owner
             FROM logs l WHERE l.user_id = ?1
             UNION ALL
             SELECT l.id, l.user_id, l.name, l.fields_json, l.share_token, l.created_at, l.updated_at,
                    l.name_key, 0 AS is_owner
             FROM logs l JOIN log_shares ls ON l.id = ls.log_id WHERE ls.user_id = ?1
             ORDER BY name_key, id",
        )
        .map_err(|e| LogbookError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((RawLog::from_row(row)?, row.get::<_, bool>("is_owner")?))
        })
        .map_err(query_err)?;

    let mut logs = Vec::new();
    for row in rows {
        let (raw, is_owner) = row.map_err(query_err)?;
        logs.push(ListedLog {
            log: raw.decode()?,
            is_owner,
        });
    }
    Ok(logs)
}

/// Rename and retype a log owned by `owner_id`.
/// Returns `None` when no such log is owned by the caller.
pub fn update_log(
    conn: &Connection,
    id: &str,
    owner_id: &str,
    name: &str,
    schema: &Schema,
    now: &DateTime<Utc>,
) -> Result<Option<LogRow>, LogbookError> {
    let changed = conn
        .execute(
            "UPDATE logs SET name = ?1, name_key = ?2, fields_json = ?3, updated_at = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![
                name,
                fold_key(name),
                encode_schema(schema)?,
                format_timestamp(now),
                id,
                owner_id
            ],
        )
        .map_err(|e| write_err(DUPLICATE_NAME, e))?;

    if changed == 0 {
        return Ok(None);
    }
    get_log(conn, id)
}

/// Delete a log owned by `owner_id`; entries and memberships cascade
pub fn delete_log(conn: &Connection, id: &str, owner_id: &str) -> Result<bool, LogbookError> {
    let deleted = conn
        .execute(
            "DELETE FROM logs WHERE id = ?1 AND user_id = ?2",
            params![id, owner_id],
        )
        .map_err(query_err)?;
    Ok(deleted > 0)
}

/// Replace or clear the share token of a log owned by `owner_id`.
/// Returns `false` when no such log is owned by the caller.
pub fn set_share_token(
    conn: &Connection,
    id: &str,
    owner_id: &str,
    token: Option<&str>,
) -> Result<bool, LogbookError> {
    let changed = conn
        .execute(
            "UPDATE logs SET share_token = ?1 WHERE id = ?2 AND user_id = ?3",
            params![token, id, owner_id],
        )
        .map_err(|e| write_err("share token collision", e))?;
    Ok(changed > 0)
}

pub fn find_by_share_token(
    conn: &Connection,
    token: &str,
) -> Result<Option<SharedLogRow>, LogbookError> {
    conn.query_row(
        "SELECT l.id, l.name, l.user_id, u.username
         FROM logs l
         JOIN users u ON l.user_id = u.id
         WHERE l.share_token = ?",
        params![token],
        |row| {
            Ok(SharedLogRow {
                log_id: row.get(0)?,
                log_name: row.get(1)?,
                owner_id: row.get(2)?,
                owner_username: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(query_err)
}
