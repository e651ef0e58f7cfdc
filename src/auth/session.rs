//! Session resolution
//!
//! Maps a presented credential to an [`Identity`] or to anonymous. Resolution
//! never fails: storage trouble degrades to anonymous and is logged.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::token::{generate_token, normalize_token};
use crate::db::{self, sessions, users::UserRow, LogDb};
use crate::error::LogbookError;

/// An authenticated user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl From<UserRow> for Identity {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
        }
    }
}

/// Outcome of resolving a presented credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Authenticated(Identity),
    /// `clear_credential` is set when a credential was presented but is
    /// malformed, unknown or expired, so the transport can drop it.
    Anonymous { clear_credential: bool },
}

impl Resolution {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Resolution::Authenticated(identity) => Some(identity),
            Resolution::Anonymous { .. } => None,
        }
    }

    pub fn clear_credential(&self) -> bool {
        matches!(self, Resolution::Anonymous { clear_credential: true })
    }
}

/// A freshly created session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionResolver {
    db: Arc<LogDb>,
    ttl: Duration,
}

impl SessionResolver {
    pub fn new(db: Arc<LogDb>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Session lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn resolve(&self, credential: Option<&str>) -> Resolution {
        self.resolve_at(credential, db::now())
    }

    /// Resolve against an explicit clock
    pub fn resolve_at(&self, credential: Option<&str>, now: DateTime<Utc>) -> Resolution {
        let presented = match credential {
            None => return Resolution::Anonymous { clear_credential: false },
            Some(token) => token,
        };

        let Some(token) = normalize_token(presented) else {
            debug!("Rejecting malformed session credential");
            return Resolution::Anonymous { clear_credential: true };
        };

        match self.db.with_conn(|conn| sessions::find_session(conn, &token)) {
            Ok(Some(session)) if session.expires_at > now => {
                Resolution::Authenticated(session.user.into())
            }
            Ok(Some(_)) => {
                debug!("Session credential expired");
                Resolution::Anonymous { clear_credential: true }
            }
            Ok(None) => {
                debug!("Unknown session credential");
                Resolution::Anonymous { clear_credential: true }
            }
            Err(e) => {
                warn!(error = %e, "Session lookup failed, treating caller as anonymous");
                Resolution::Anonymous { clear_credential: false }
            }
        }
    }

    /// Create a session for `user_id`
    pub fn create(&self, user_id: &str) -> Result<IssuedSession, LogbookError> {
        self.create_at(user_id, db::now())
    }

    pub fn create_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<IssuedSession, LogbookError> {
        let token = generate_token();
        let expires_at = now + self.ttl;

        self.db.with_conn_mut(|conn| {
            sessions::insert_session(conn, &token, user_id, &expires_at, &now)
        })?;

        debug!(user_id = %user_id, "Session created");
        Ok(IssuedSession { token, expires_at })
    }

    /// Delete the session behind `credential`. Unknown, malformed or absent
    /// credentials are accepted silently.
    pub fn logout(&self, credential: Option<&str>) {
        let Some(token) = credential.and_then(normalize_token) else {
            return;
        };

        if let Err(e) = self.db.with_conn_mut(|conn| sessions::delete_session(conn, &token)) {
            warn!(error = %e, "Failed to delete session on logout");
        }
    }
}
