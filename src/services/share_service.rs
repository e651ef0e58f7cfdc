//! Share service - share tokens and memberships
//!
//! A log has at most one live share token. Issuing a new one replaces the
//! old, which stops granting membership at once. Redeeming a token makes
//! the caller a member; redeeming it again changes nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::access::{log_not_found, resolve_access};
use crate::auth::{generate_token, normalize_token, Identity};
use crate::db::{self, logs, members, LogDb};
use crate::error::LogbookError;

pub const INVALID_SHARE_LINK: &str = "invalid share link";
pub const SHARE_NOT_FOUND: &str = "share not found";

#[derive(Debug, Clone, Serialize)]
pub struct ShareTokenView {
    pub share_token: String,
}

/// What a share token points at, from the caller's point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareInfo {
    pub log_id: String,
    pub log_name: String,
    pub owner_username: String,
    pub is_owner: bool,
    pub already_member: bool,
}

/// Result of redeeming a share token
#[derive(Debug, Clone, Serialize)]
pub struct Joined {
    pub log_id: String,
    pub log_name: String,
    pub membership_id: String,
    /// False when the caller was already a member
    #[serde(skip)]
    pub created: bool,
}

/// A member as listed to the owner
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: String,
    pub username: String,
    pub shared_at: DateTime<Utc>,
}

impl From<members::MembershipRow> for MemberView {
    fn from(row: members::MembershipRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            shared_at: row.joined_at,
        }
    }
}

fn invalid_share_link() -> LogbookError {
    LogbookError::NotFound(INVALID_SHARE_LINK.into())
}

pub struct ShareService {
    db: Arc<LogDb>,
}

impl ShareService {
    pub fn new(db: Arc<LogDb>) -> Self {
        Self { db }
    }

    /// Look up the log behind a presented token
    fn shared_log(conn: &rusqlite::Connection, token: &str) -> Result<logs::SharedLogRow, LogbookError> {
        let token = normalize_token(token).ok_or_else(invalid_share_link)?;
        logs::find_by_share_token(conn, &token)?.ok_or_else(invalid_share_link)
    }

    /// Issue a fresh token, replacing any existing one
    pub fn issue_token(&self, identity: &Identity, log_id: &str) -> Result<ShareTokenView, LogbookError> {
        let token = generate_token();

        self.db.with_conn_mut(|conn| {
            resolve_access(conn, log_id, &identity.id)?.require_owner()?;
            if !logs::set_share_token(conn, log_id, &identity.id, Some(token.as_str()))? {
                return Err(log_not_found());
            }
            Ok(())
        })?;

        info!(log_id = %log_id, "Share token issued");
        Ok(ShareTokenView { share_token: token })
    }

    /// Clear the token. Clearing an absent token is fine.
    pub fn revoke_token(&self, identity: &Identity, log_id: &str) -> Result<(), LogbookError> {
        self.db.with_conn_mut(|conn| {
            resolve_access(conn, log_id, &identity.id)?.require_owner()?;
            if !logs::set_share_token(conn, log_id, &identity.id, None)? {
                return Err(log_not_found());
            }
            Ok(())
        })?;

        info!(log_id = %log_id, "Share token revoked");
        Ok(())
    }

    /// Describe a token's log without joining it
    pub fn inspect_token(&self, identity: &Identity, token: &str) -> Result<ShareInfo, LogbookError> {
        self.db.with_conn(|conn| {
            let shared = Self::shared_log(conn, token)?;
            let is_owner = shared.owner_id == identity.id;
            let already_member =
                !is_owner && members::membership_exists(conn, &shared.log_id, &identity.id)?;

            Ok(ShareInfo {
                log_id: shared.log_id,
                log_name: shared.log_name,
                owner_username: shared.owner_username,
                is_owner,
                already_member,
            })
        })
    }

    /// Redeem a token. Owners cannot join their own log.
    pub fn join(&self, identity: &Identity, token: &str) -> Result<Joined, LogbookError> {
        let joined = self.db.with_conn_mut(|conn| {
            let shared = Self::shared_log(conn, token)?;
            if shared.owner_id == identity.id {
                return Err(LogbookError::OwnerCannotJoin);
            }

            let (membership_id, created) =
                match members::insert_membership(conn, &shared.log_id, &identity.id, &db::now()) {
                    Ok(id) => (id, true),
                    Err(LogbookError::Conflict(_)) => {
                        let existing = members::find_membership(conn, &shared.log_id, &identity.id)?
                            .ok_or_else(|| {
                                LogbookError::Internal("membership conflict without a row".into())
                            })?;
                        (existing.id, false)
                    }
                    Err(e) => return Err(e),
                };

            Ok(Joined {
                log_id: shared.log_id,
                log_name: shared.log_name,
                membership_id,
                created,
            })
        })?;

        if joined.created {
            info!(log_id = %joined.log_id, user_id = %identity.id, "Joined log");
        } else {
            debug!(log_id = %joined.log_id, user_id = %identity.id, "Already a member");
        }
        Ok(joined)
    }

    /// Members in join order. Owner only.
    pub fn list_members(&self, identity: &Identity, log_id: &str) -> Result<Vec<MemberView>, LogbookError> {
        self.db.with_conn(|conn| {
            resolve_access(conn, log_id, &identity.id)?.require_owner()?;
            let rows = members::list_members(conn, log_id)?;
            Ok(rows.into_iter().map(MemberView::from).collect())
        })
    }

    /// Remove a membership by its id. Owner only.
    pub fn remove_member(&self, identity: &Identity, log_id: &str, membership_id: &str) -> Result<(), LogbookError> {
        self.db.with_conn_mut(|conn| {
            resolve_access(conn, log_id, &identity.id)?.require_owner()?;
            if !members::delete_membership(conn, log_id, membership_id)? {
                return Err(LogbookError::NotFound(SHARE_NOT_FOUND.into()));
            }
            Ok(())
        })?;

        info!(log_id = %log_id, membership_id = %membership_id, "Member removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users;
    use crate::validation::Schema;

    struct Fixture {
        shares: ShareService,
        alice: Identity,
        bob: Identity,
        log_id: String,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LogDb::open_in_memory().unwrap());
        let (alice, bob, log_id) = store
            .with_conn(|conn| {
                let alice = users::create_user(conn, "alice", None, "h", &db::now())?;
                let bob = users::create_user(conn, "bob", None, "h", &db::now())?;
                let log = logs::create_log(conn, &alice.id, "Water", &Schema::empty(), &db::now())?;
                Ok((alice, bob, log.id))
            })
            .unwrap();
        Fixture {
            shares: ShareService::new(store),
            alice: alice.into(),
            bob: bob.into(),
            log_id,
        }
    }

    #[test]
    fn test_join_is_idempotent() {
        let f = fixture();
        let token = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;

        let first = f.shares.join(&f.bob, &token).unwrap();
        let second = f.shares.join(&f.bob, &token).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.membership_id, second.membership_id);
        assert_eq!(f.shares.list_members(&f.alice, &f.log_id).unwrap().len(), 1);
    }

    #[test]
    fn test_owner_cannot_join() {
        let f = fixture();
        let token = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;
        let err = f.shares.join(&f.alice, &token).unwrap_err();
        assert!(matches!(err, LogbookError::OwnerCannotJoin));
    }

    #[test]
    fn test_reissue_invalidates_old_token() {
        let f = fixture();
        let old = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;
        let new = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;
        assert_ne!(old, new);

        let err = f.shares.join(&f.bob, &old).unwrap_err();
        assert!(matches!(err, LogbookError::NotFound(ref m) if m == INVALID_SHARE_LINK));
        assert!(f.shares.join(&f.bob, &new).is_ok());
    }

    #[test]
    fn test_revoke_is_repeatable() {
        let f = fixture();
        let token = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;
        f.shares.revoke_token(&f.alice, &f.log_id).unwrap();
        f.shares.revoke_token(&f.alice, &f.log_id).unwrap();
        assert!(f.shares.inspect_token(&f.bob, &token).is_err());
    }

    #[test]
    fn test_inspect_reports_caller_relationship() {
        let f = fixture();
        let token = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;

        let for_owner = f.shares.inspect_token(&f.alice, &token).unwrap();
        assert!(for_owner.is_owner);
        assert!(!for_owner.already_member);

        let before = f.shares.inspect_token(&f.bob, &token).unwrap();
        assert_eq!(before.owner_username, "alice");
        assert!(!before.already_member);

        f.shares.join(&f.bob, &token).unwrap();
        assert!(f.shares.inspect_token(&f.bob, &token).unwrap().already_member);
    }

    #[test]
    fn test_uppercase_share_token_is_accepted() {
        let f = fixture();
        let token = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;
        let joined = f.shares.join(&f.bob, &token.to_uppercase()).unwrap();
        assert_eq!(joined.log_id, f.log_id);
    }

    #[test]
    fn test_malformed_token() {
        let f = fixture();
        let err = f.shares.inspect_token(&f.bob, "zz-not-hex").unwrap_err();
        assert_eq!(err.to_string(), INVALID_SHARE_LINK);
    }

    #[test]
    fn test_member_management_is_owner_only() {
        let f = fixture();
        let token = f.shares.issue_token(&f.alice, &f.log_id).unwrap().share_token;
        let joined = f.shares.join(&f.bob, &token).unwrap();

        assert!(matches!(
            f.shares.issue_token(&f.bob, &f.log_id),
            Err(LogbookError::NotFound(_))
        ));
        assert!(matches!(
            f.shares.list_members(&f.bob, &f.log_id),
            Err(LogbookError::NotFound(_))
        ));
        assert!(matches!(
            f.shares.remove_member(&f.bob, &f.log_id, &joined.membership_id),
            Err(LogbookError::NotFound(_))
        ));

        f.shares.remove_member(&f.alice, &f.log_id, &joined.membership_id).unwrap();
        let err = f
            .shares
            .remove_member(&f.alice, &f.log_id, &joined.membership_id)
            .unwrap_err();
        assert_eq!(err.to_string(), SHARE_NOT_FOUND);
    }
}
