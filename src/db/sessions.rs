//! Session rows
//!
//! Expired rows are left in place. Readers compare `expires_at` themselves.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::users::UserRow;
use super::{format_timestamp, parse_timestamp, query_err, write_err};
use crate::error::LogbookError;

/// A stored session joined with its user
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserRow,
}

pub fn insert_session(
    conn: &Connection,
    token: &str,
    user_id: &str,
    expires_at: &DateTime<Utc>,
    now: &DateTime<Utc>,
) -> Result<(), LogbookError> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![token, user_id, format_timestamp(expires_at), format_timestamp(now)],
    )
    .map_err(|e| write_err("session token collision", e))?;
    Ok(())
}

/// Fetch a session by token regardless of expiry
pub fn find_session(conn: &Connection, token: &str) -> Result<Option<SessionRow>, LogbookError> {
    let raw = conn
        .query_row(
            "SELECT s.token, s.expires_at, u.id, u.username, u.email
             FROM sessions s
             JOIN users u ON s.user_id = u.id
             WHERE s.token = ?",
            params![token],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    UserRow {
                        id: row.get(2)?,
                        username: row.get(3)?,
                        email: row.get(4)?,
                    },
                ))
            },
        )
        .optional()
        .map_err(query_err)?;

    match raw {
        Some((token, expires_at, user)) => Ok(Some(SessionRow {
            token,
            expires_at: parse_timestamp(&expires_at)?,
            user,
        })),
        None => Ok(None),
    }
}

/// Delete a session. Returns whether a row was removed.
pub fn delete_session(conn: &Connection, token: &str) -> Result<bool, LogbookError> {
    let deleted = conn
        .execute("DELETE FROM sessions WHERE token = ?", params![token])
        .map_err(query_err)?;
    Ok(deleted > 0)
}
