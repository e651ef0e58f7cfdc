//! Service layer for logbook
//!
//! Services hold the business rules between HTTP handlers and repositories.
//! Every operation takes the resolved [`Identity`](crate::auth::Identity) as
//! an explicit argument.
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (access, validation)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod account_service;
pub mod log_service;
pub mod share_service;

pub use response::*;
pub use account_service::AccountService;
pub use log_service::LogService;
pub use share_service::ShareService;

use std::sync::Arc;

use crate::auth::SessionResolver;
use crate::config::Config;
use crate::db::LogDb;

/// Service container
///
/// Holds all services over one shared database. Pass this to `HttpServer`.
pub struct Services {
    pub db: Arc<LogDb>,
    pub sessions: Arc<SessionResolver>,
    pub accounts: Arc<AccountService>,
    pub logs: Arc<LogService>,
    pub shares: Arc<ShareService>,
}

impl Services {
    pub fn new(db: Arc<LogDb>, config: &Config) -> Self {
        let sessions = Arc::new(SessionResolver::new(db.clone(), config.session_ttl()));

        Self {
            accounts: Arc::new(AccountService::new(
                db.clone(),
                sessions.clone(),
                config.allow_registration,
            )),
            logs: Arc::new(LogService::new(db.clone())),
            shares: Arc::new(ShareService::new(db.clone())),
            sessions,
            db,
        }
    }
}
