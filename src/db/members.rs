//! Membership rows (`log_shares`)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, query_err, write_err};
use crate::error::LogbookError;

/// Membership row joined with the member's username
#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub id: String,
    pub log_id: String,
    pub user_id: String,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

struct RawMembership {
    id: String,
    log_id: String,
    user_id: String,
    username: String,
    created_at: String,
}

impl RawMembership {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            log_id: row.get("log_id")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            created_at: row.get("created_at")?,
        })
    }

    fn decode(self) -> Result<MembershipRow, LogbookError> {
        Ok(MembershipRow {
            joined_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            log_id: self.log_id,
            user_id: self.user_id,
            username: self.username,
        })
    }
}

const MEMBER_SELECT: &str = "SELECT ls.id, ls.log_id, ls.user_id, u.username, ls.created_at
     FROM log_shares ls
     JOIN users u ON ls.user_id = u.id";

/// Insert a membership. An existing pair is a `Conflict`.
pub fn insert_membership(
    conn: &Connection,
    log_id: &str,
    user_id: &str,
    now: &DateTime<Utc>,
) -> Result<String, LogbookError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO log_shares (id, log_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, log_id, user_id, format_timestamp(now)],
    )
    .map_err(|e| write_err("already a member of this log", e))?;
    Ok(id)
}

pub fn find_membership(
    conn: &Connection,
    log_id: &str,
    user_id: &str,
) -> Result<Option<MembershipRow>, LogbookError> {
    let raw = conn
        .query_row(
            &format!("{} WHERE ls.log_id = ?1 AND ls.user_id = ?2", MEMBER_SELECT),
            params![log_id, user_id],
            RawMembership::from_row,
        )
        .optional()
        .map_err(query_err)?;
    raw.map(RawMembership::decode).transpose()
}

pub fn membership_exists(conn: &Connection, log_id: &str, user_id: &str) -> Result<bool, LogbookError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM log_shares WHERE log_id = ?1 AND user_id = ?2)",
        params![log_id, user_id],
        |row| row.get(0),
    )
    .map_err(query_err)
}

/// Members of a log, earliest join first
pub fn list_members(conn: &Connection, log_id: &str) -> Result<Vec<MembershipRow>, LogbookError> {
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE ls.log_id = ? ORDER BY ls.created_at, ls.rowid",
            MEMBER_SELECT
        ))
        .map_err(|e| LogbookError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![log_id], RawMembership::from_row)
        .map_err(query_err)?;

    let mut members = Vec::new();
    for row in rows {
        members.push(row.map_err(query_err)?.decode()?);
    }
    Ok(members)
}

/// Delete a membership row belonging to `log_id`
pub fn delete_membership(conn: &Connection, log_id: &str, membership_id: &str) -> Result<bool, LogbookError> {
    let deleted = conn
        .execute(
            "DELETE FROM log_shares WHERE id = ?1 AND log_id = ?2",
            params![membership_id, log_id],
        )
        .map_err(query_err)?;
    Ok(deleted > 0)
}
