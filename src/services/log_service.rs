//! Log service - logs and their entries
//!
//! Each operation resolves access and performs its writes under a single
//! connection lock, so validation always sees the schema it writes against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::access::{log_not_found, resolve_access};
use crate::auth::Identity;
use crate::db::{self, entries, logs, LogDb};
use crate::error::LogbookError;
use crate::validation::{validate_schema, validate_values, ProposedField, Schema};

const MAX_LOG_NAME_LEN: usize = 100;
pub const ENTRY_NOT_FOUND: &str = "entry not found";

/// Body of log create and update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Option<Vec<ProposedField>>,
}

impl LogInput {
    pub fn new(name: impl Into<String>, fields: Vec<ProposedField>) -> Self {
        Self {
            name: name.into(),
            fields: Some(fields),
        }
    }
}

/// Body of entry create and update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryInput {
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl EntryInput {
    pub fn new(fields: Value) -> Self {
        Self {
            fields: fields.as_object().cloned(),
            occurred_at: None,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// A log as returned to one caller
#[derive(Debug, Clone, Serialize)]
pub struct LogView {
    pub id: String,
    pub name: String,
    pub fields: Schema,
    pub is_owner: bool,
    /// Only ever set for the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogView {
    fn new(row: logs::LogRow, is_owner: bool) -> Self {
        Self {
            share_token: if is_owner { row.share_token } else { None },
            id: row.id,
            name: row.name,
            fields: row.schema,
            is_owner,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub id: String,
    pub log_id: String,
    pub user_id: String,
    pub username: String,
    pub fields: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entries::EntryRow> for EntryView {
    fn from(row: entries::EntryRow) -> Self {
        Self {
            id: row.id,
            log_id: row.log_id,
            user_id: row.user_id,
            username: row.username,
            fields: row.fields,
            occurred_at: row.occurred_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Trim and check a log name, then validate its schema
fn validate_log_input(input: LogInput) -> Result<(String, Schema), LogbookError> {
    let name = input.name.trim().to_string();
    let len = name.chars().count();
    if len == 0 || len > MAX_LOG_NAME_LEN {
        return Err(LogbookError::invalid_input("name must be 1-100 characters"));
    }

    let mut fields = input.fields.unwrap_or_default();
    let schema = validate_schema(&mut fields)?;
    Ok((name, schema))
}

fn entry_not_found() -> LogbookError {
    LogbookError::NotFound(ENTRY_NOT_FOUND.into())
}

pub struct LogService {
    db: Arc<LogDb>,
}

impl LogService {
    pub fn new(db: Arc<LogDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Logs
    // =========================================================================

    pub fn create_log(&self, identity: &Identity, input: LogInput) -> Result<LogView, LogbookError> {
        let (name, schema) = validate_log_input(input)?;

        let row = self.db.with_conn_mut(|conn| {
            logs::create_log(conn, &identity.id, &name, &schema, &db::now())
        })?;

        info!(log_id = %row.id, user_id = %identity.id, fields = row.schema.len(), "Log created");
        Ok(LogView::new(row, true))
    }

    /// Owned and shared logs, by name ignoring case
    pub fn list_logs(&self, identity: &Identity) -> Result<Vec<LogView>, LogbookError> {
        let listed = self
            .db
            .with_conn(|conn| logs::list_logs_for_user(conn, &identity.id))?;

        Ok(listed
            .into_iter()
            .map(|l| LogView::new(l.log, l.is_owner))
            .collect())
    }

    pub fn get_log(&self, identity: &Identity, log_id: &str) -> Result<LogView, LogbookError> {
        self.db.with_conn(|conn| {
            let grant = resolve_access(conn, log_id, &identity.id)?;
            let row = logs::get_log(conn, log_id)?.ok_or_else(log_not_found)?;
            Ok(LogView::new(row, grant.is_owner))
        })
    }

    /// Rename and retype. Existing entries are left as written.
    pub fn update_log(
        &self,
        identity: &Identity,
        log_id: &str,
        input: LogInput,
    ) -> Result<LogView, LogbookError> {
        let (name, schema) = validate_log_input(input)?;

        let row = self.db.with_conn_mut(|conn| {
            resolve_access(conn, log_id, &identity.id)?.require_owner()?;
            logs::update_log(conn, log_id, &identity.id, &name, &schema, &db::now())?
                .ok_or_else(log_not_found)
        })?;

        info!(log_id = %log_id, fields = row.schema.len(), "Log updated");
        Ok(LogView::new(row, true))
    }

    /// Delete a log with its entries and memberships
    pub fn delete_log(&self, identity: &Identity, log_id: &str) -> Result<(), LogbookError> {
        self.db.with_conn_mut(|conn| {
            resolve_access(conn, log_id, &identity.id)?.require_owner()?;
            if !logs::delete_log(conn, log_id, &identity.id)? {
                return Err(log_not_found());
            }
            Ok(())
        })?;

        info!(log_id = %log_id, "Log deleted");
        Ok(())
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Newest `occurred_at` first
    pub fn list_entries(&self, identity: &Identity, log_id: &str) -> Result<Vec<EntryView>, LogbookError> {
        self.db.with_conn(|conn| {
            resolve_access(conn, log_id, &identity.id)?;
            let rows = entries::list_entries(conn, log_id)?;
            Ok(rows.into_iter().map(EntryView::from).collect())
        })
    }

    /// Validate against the current schema and insert. `occurred_at`
    /// defaults to now.
    pub fn create_entry(
        &self,
        identity: &Identity,
        log_id: &str,
        input: EntryInput,
    ) -> Result<EntryView, LogbookError> {
        let fields = input.fields.unwrap_or_default();

        let row = self.db.with_conn_mut(|conn| {
            let grant = resolve_access(conn, log_id, &identity.id)?;
            validate_values(&grant.schema, Some(&fields))?;

            let now = db::now();
            entries::create_entry(
                conn,
                entries::NewEntry {
                    log_id,
                    user_id: &identity.id,
                    fields: &fields,
                    occurred_at: input.occurred_at.unwrap_or(now),
                },
                &now,
            )
        })?;

        info!(log_id = %log_id, entry_id = %row.id, user_id = %identity.id, "Entry created");
        Ok(row.into())
    }

    /// Replace an entry's values and time. `occurred_at` is mandatory.
    pub fn update_entry(
        &self,
        identity: &Identity,
        log_id: &str,
        entry_id: &str,
        input: EntryInput,
    ) -> Result<EntryView, LogbookError> {
        let occurred_at = input
            .occurred_at
            .ok_or_else(|| LogbookError::invalid_input("occurred_at is required"))?;
        let fields = input.fields.unwrap_or_default();

        let row = self.db.with_conn_mut(|conn| {
            let grant = resolve_access(conn, log_id, &identity.id)?;
            validate_values(&grant.schema, Some(&fields))?;

            entries::update_entry(conn, log_id, entry_id, &fields, &occurred_at, &db::now())?
                .ok_or_else(entry_not_found)
        })?;

        info!(log_id = %log_id, entry_id = %entry_id, "Entry updated");
        Ok(row.into())
    }

    pub fn delete_entry(&self, identity: &Identity, log_id: &str, entry_id: &str) -> Result<(), LogbookError> {
        self.db.with_conn_mut(|conn| {
            resolve_access(conn, log_id, &identity.id)?;
            if !entries::delete_entry(conn, log_id, entry_id)? {
                return Err(entry_not_found());
            }
            Ok(())
        })?;

        info!(log_id = %log_id, entry_id = %entry_id, "Entry deleted");
        Ok(())
    }
}
