//! User (identity) rows

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{fold_key, format_timestamp, is_unique_violation, query_err};
use crate::error::LogbookError;

/// User row without credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
        })
    }
}

/// Distinguish which uniqueness constraint a user write tripped
fn user_write_err(e: rusqlite::Error) -> LogbookError {
    if is_unique_violation(&e) {
        if e.to_string().contains("users.email") {
            LogbookError::Conflict("email already in use".into())
        } else {
            LogbookError::Conflict("username already taken".into())
        }
    } else {
        LogbookError::Internal(format!("User write failed: {}", e))
    }
}

/// Insert a user. Username and email uniqueness are enforced by the store.
pub fn create_user(
    conn: &Connection,
    username: &str,
    email: Option<&str>,
    password_hash: &str,
    now: &DateTime<Utc>,
) -> Result<UserRow, LogbookError> {
    let id = Uuid::new_v4().to_string();
    let ts = format_timestamp(now);

    conn.execute(
        "INSERT INTO users (id, username, username_key, email, password_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![id, username, fold_key(username), email, password_hash, ts],
    )
    .map_err(user_write_err)?;

    Ok(UserRow {
        id,
        username: username.to_string(),
        email: email.map(str::to_string),
    })
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserRow>, LogbookError> {
    conn.query_row(
        "SELECT id, username, email FROM users WHERE id = ?",
        params![id],
        UserRow::from_row,
    )
    .optional()
    .map_err(query_err)
}

/// Look up a user and password hash by username, ignoring case
pub fn find_credentials(
    conn: &Connection,
    username: &str,
) -> Result<Option<(UserRow, String)>, LogbookError> {
    conn.query_row(
        "SELECT id, username, email, password_hash FROM users WHERE username_key = ?",
        params![fold_key(username)],
        |row| Ok((UserRow::from_row(row)?, row.get("password_hash")?)),
    )
    .optional()
    .map_err(query_err)
}

pub fn get_password_hash(conn: &Connection, id: &str) -> Result<Option<String>, LogbookError> {
    conn.query_row(
        "SELECT password_hash FROM users WHERE id = ?",
        params![id],
        |row| row.get(0),
    )
    .optional()
    .map_err(query_err)
}

/// Set or clear the email. Returns `None` if the user does not exist.
pub fn update_email(
    conn: &Connection,
    id: &str,
    email: Option<&str>,
    now: &DateTime<Utc>,
) -> Result<Option<UserRow>, LogbookError> {
    let changed = conn
        .execute(
            "UPDATE users SET email = ?1, updated_at = ?2 WHERE id = ?3",
            params![email, format_timestamp(now), id],
        )
        .map_err(user_write_err)?;

    if changed == 0 {
        return Ok(None);
    }
    get_user(conn, id)
}

pub fn update_password_hash(
    conn: &Connection,
    id: &str,
    password_hash: &str,
    now: &DateTime<Utc>,
) -> Result<bool, LogbookError> {
    let changed = conn
        .execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, format_timestamp(now), id],
        )
        .map_err(user_write_err)?;
    Ok(changed > 0)
}
