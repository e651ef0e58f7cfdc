//! Account service - registration, sign-in and profile changes

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::password::MIN_PASSWORD_LEN;
use crate::auth::{hash_password, verify_password, Identity, IssuedSession, SessionResolver};
use crate::db::{self, users, LogDb};
use crate::error::LogbookError;

const MAX_USERNAME_LEN: usize = 30;
const BAD_CREDENTIALS: &str = "invalid username or password";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailInput {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordInput {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Public server settings
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub allow_registration: bool,
}

/// A signed-in identity and the session backing it
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub identity: Identity,
    pub session: IssuedSession,
}

pub struct AccountService {
    db: Arc<LogDb>,
    sessions: Arc<SessionResolver>,
    allow_registration: bool,
}

/// Trim an email; blank means none
fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

fn check_password_len(password: &str) -> Result<(), LogbookError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LogbookError::invalid_input(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

impl AccountService {
    pub fn new(db: Arc<LogDb>, sessions: Arc<SessionResolver>, allow_registration: bool) -> Self {
        Self {
            db,
            sessions,
            allow_registration,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            allow_registration: self.allow_registration,
        }
    }

    /// Create an account and sign it in
    pub fn register(&self, input: RegisterInput) -> Result<SignedIn, LogbookError> {
        if !self.allow_registration {
            return Err(LogbookError::Forbidden("registration is currently disabled".into()));
        }

        let username = input.username.trim();
        let len = username.chars().count();
        if len == 0 || len > MAX_USERNAME_LEN {
            return Err(LogbookError::invalid_input("username must be 1-30 characters"));
        }
        check_password_len(&input.password)?;
        let email = normalize_email(input.email);

        let hash = hash_password(&input.password)?;
        let user = self.db.with_conn_mut(|conn| {
            users::create_user(conn, username, email.as_deref(), &hash, &db::now())
        })?;

        let session = self.sessions.create(&user.id)?;
        info!(user_id = %user.id, username = %user.username, "Account registered");

        Ok(SignedIn {
            identity: user.into(),
            session,
        })
    }

    /// Check credentials and open a session. Unknown user and wrong
    /// password are reported identically.
    pub fn login(&self, input: LoginInput) -> Result<SignedIn, LogbookError> {
        let found = self
            .db
            .with_conn(|conn| users::find_credentials(conn, input.username.trim()))?;

        let Some((user, hash)) = found else {
            return Err(LogbookError::Unauthenticated(BAD_CREDENTIALS.into()));
        };

        if !verify_password(&input.password, &hash)? {
            warn!(user_id = %user.id, "Login rejected: wrong password");
            return Err(LogbookError::Unauthenticated(BAD_CREDENTIALS.into()));
        }

        let session = self.sessions.create(&user.id)?;
        info!(user_id = %user.id, "Signed in");

        Ok(SignedIn {
            identity: user.into(),
            session,
        })
    }

    pub fn logout(&self, credential: Option<&str>) {
        self.sessions.logout(credential);
    }

    /// Fresh copy of the caller's account
    pub fn me(&self, identity: &Identity) -> Result<Identity, LogbookError> {
        self.db
            .with_conn(|conn| users::get_user(conn, &identity.id))?
            .map(Identity::from)
            .ok_or_else(|| LogbookError::Unauthenticated("authentication required".into()))
    }

    /// Set or clear the caller's email
    pub fn change_email(&self, identity: &Identity, input: EmailInput) -> Result<Identity, LogbookError> {
        let email = normalize_email(input.email);
        let updated = self.db.with_conn_mut(|conn| {
            users::update_email(conn, &identity.id, email.as_deref(), &db::now())
        })?;

        let user = updated
            .ok_or_else(|| LogbookError::Unauthenticated("authentication required".into()))?;
        info!(user_id = %user.id, "Email updated");
        Ok(user.into())
    }

    /// Replace the caller's password after checking the current one
    pub fn change_password(&self, identity: &Identity, input: PasswordInput) -> Result<(), LogbookError> {
        check_password_len(&input.new_password)?;

        let stored = self
            .db
            .with_conn(|conn| users::get_password_hash(conn, &identity.id))?
            .ok_or_else(|| LogbookError::Unauthenticated("authentication required".into()))?;

        if !verify_password(&input.current_password, &stored)? {
            warn!(user_id = %identity.id, "Password change rejected: wrong current password");
            return Err(LogbookError::Forbidden("current password is incorrect".into()));
        }

        let hash = hash_password(&input.new_password)?;
        self.db.with_conn_mut(|conn| {
            users::update_password_hash(conn, &identity.id, &hash, &db::now())
        })?;

        info!(user_id = %identity.id, "Password changed");
        Ok(())
    }
}
