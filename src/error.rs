//! Error types for logbook

use thiserror::Error;

use crate::validation::{SchemaError, ValueError};

/// Rejected caller input. Always recoverable by the caller, never a
/// partial mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("{0}")]
    Input(String),
}

#[derive(Error, Debug)]
pub enum LogbookError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No such resource, or no access to it. The two are never told apart.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation reported by the store
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("you already own this log")]
    OwnerCannotJoin,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LogbookError {
    /// Shorthand for an input rejection that is not a schema or value rule
    pub fn invalid_input(message: impl Into<String>) -> Self {
        LogbookError::Validation(ValidationError::Input(message.into()))
    }

    /// True for failures whose details must stay out of responses
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            LogbookError::Internal(_)
                | LogbookError::Io(_)
                | LogbookError::Config(_)
        )
    }
}

impl From<SchemaError> for LogbookError {
    fn from(e: SchemaError) -> Self {
        LogbookError::Validation(ValidationError::Schema(e))
    }
}

impl From<ValueError> for LogbookError {
    fn from(e: ValueError) -> Self {
        LogbookError::Validation(ValidationError::Value(e))
    }
}

pub type Result<T> = std::result::Result<T, LogbookError>;
