//! Logbook - personal event logs with share links
//!
//! Each user owns logs with a small field schema. Entries are validated
//! against that schema when written. An owner can hand out a share link;
//! redeeming it makes the holder a member who may read the log and add
//! entries, while renaming, deleting and share management stay with the
//! owner.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/logbook/
//! ├── logbook.db             # SQLite: users, sessions, logs, entries, memberships
//! └── config.toml            # Configuration
//! ```
//!
//! ## Layers
//!
//! - [`validation`] - pure schema and value rules
//! - [`db`] - SQLite repositories
//! - [`auth`] - passwords, tokens and session resolution
//! - [`access`] - owner/member/none decision for a log
//! - [`services`] - the operations, one service per concern
//! - [`http`] - hyper server mapping requests onto services

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;
pub mod validation;

pub use config::Config;
pub use db::LogDb;
pub use error::{LogbookError, Result};
pub use http::HttpServer;
pub use services::Services;
