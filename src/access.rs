//! Log access resolution
//!
//! Every operation on a log or its entries goes through [`resolve_access`].
//! A caller with no relationship to a log gets the same `NotFound` as a
//! caller asking for a log that does not exist, and members asking for
//! owner-only operations get it too.

use rusqlite::Connection;

use crate::db::{logs, members};
use crate::error::LogbookError;
use crate::validation::Schema;

pub const LOG_NOT_FOUND: &str = "log not found";

/// What an identity may do with a log, plus the schema to validate against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub log_id: String,
    pub owner_id: String,
    pub is_owner: bool,
    pub schema: Schema,
}

impl AccessGrant {
    /// Narrow the grant to owners. Members get `NotFound`.
    pub fn require_owner(self) -> Result<Self, LogbookError> {
        if self.is_owner {
            Ok(self)
        } else {
            Err(log_not_found())
        }
    }
}

pub fn log_not_found() -> LogbookError {
    LogbookError::NotFound(LOG_NOT_FOUND.into())
}

/// Resolve `identity_id`'s access to `log_id` on an open connection
pub fn resolve_access(
    conn: &Connection,
    log_id: &str,
    identity_id: &str,
) -> Result<AccessGrant, LogbookError> {
    let (owner_id, schema) = logs::get_owner_and_schema(conn, log_id)?
        .ok_or_else(log_not_found)?;

    let is_owner = owner_id == identity_id;
    if !is_owner && !members::membership_exists(conn, log_id, identity_id)? {
        return Err(log_not_found());
    }

    Ok(AccessGrant {
        log_id: log_id.to_string(),
        owner_id,
        is_owner,
        schema,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::{now, users, LogDb};
    use crate::validation::{validate_schema, ProposedField};

    struct Fixture {
        db: Arc<LogDb>,
        owner: String,
        stranger: String,
        log_id: String,
    }

    impl Fixture {
        fn resolve(&self, log_id: &str, identity_id: &str) -> Result<AccessGrant, LogbookError> {
            self.db.with_conn(|conn| resolve_access(conn, log_id, identity_id))
        }

        fn add_user(&self, username: &str) -> String {
            self.db
                .with_conn(|conn| users::create_user(conn, username, None, "h", &now()))
                .unwrap()
                .id
        }

        fn join(&self, identity_id: &str) {
            self.db
                .with_conn(|conn| members::insert_membership(conn, &self.log_id, identity_id, &now()))
                .unwrap();
        }
    }

    fn fixture() -> Fixture {
        let db = Arc::new(LogDb::open_in_memory().unwrap());
        let (owner, stranger, log_id) = db
            .with_conn(|conn| {
                let owner = users::create_user(conn, "alice", None, "h", &now())?;
                let stranger = users::create_user(conn, "bob", None, "h", &now())?;
                let schema = validate_schema(&mut [ProposedField::new("count", "number", true)])?;
                let log = logs::create_log(conn, &owner.id, "Pushups", &schema, &now())?;
                Ok((owner.id, stranger.id, log.id))
            })
            .unwrap();
        Fixture {
            db,
            owner,
            stranger,
            log_id,
        }
    }

    #[test]
    fn test_owner_gets_grant_with_schema() {
        let f = fixture();
        let grant = f.resolve(&f.log_id, &f.owner).unwrap();
        assert!(grant.is_owner);
        assert_eq!(grant.schema.len(), 1);
        assert!(grant.require_owner().is_ok());
    }

    #[test]
    fn test_stranger_and_missing_log_look_the_same() {
        let f = fixture();
        let stranger = f.resolve(&f.log_id, &f.stranger).unwrap_err();
        let missing = f.resolve("no-such-log", &f.owner).unwrap_err();
        assert_eq!(stranger.to_string(), missing.to_string());
        assert!(matches!(stranger, LogbookError::NotFound(_)));
    }

    #[test]
    fn test_member_is_not_owner() {
        let f = fixture();
        f.join(&f.stranger);

        let grant = f.resolve(&f.log_id, &f.stranger).unwrap();
        assert!(!grant.is_owner);
        assert_eq!(grant.owner_id, f.owner);

        let err = grant.require_owner().unwrap_err();
        assert!(matches!(err, LogbookError::NotFound(ref m) if m == LOG_NOT_FOUND));
    }

    #[test]
    fn test_exactly_one_identity_owns_a_log() {
        let f = fixture();
        let members: Vec<String> = ["carol", "dave", "erin"]
            .iter()
            .map(|name| f.add_user(name))
            .collect();
        for member in &members {
            f.join(member);
        }

        let mut everyone = vec![f.owner.clone(), f.stranger.clone()];
        everyone.extend(members.iter().cloned());

        let grants: Vec<_> = everyone
            .iter()
            .filter_map(|id| f.resolve(&f.log_id, id).ok())
            .collect();

        // owner plus three members; the stranger gets nothing
        assert_eq!(grants.len(), 4);
        let owners: Vec<_> = grants.iter().filter(|g| g.is_owner).collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].owner_id, f.owner);
        assert!(grants.iter().all(|g| g.owner_id == f.owner));
    }
}
