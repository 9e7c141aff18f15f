use rusqlite::ErrorCode;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnstateError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl LearnstateError {
    /// Short machine-readable tag used in CLI envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            LearnstateError::RusqliteError(_) => "sqlite",
            LearnstateError::IoError(_) => "io",
            LearnstateError::JsonError(_) => "json",
            LearnstateError::ConfigError(_) => "config",
            LearnstateError::ValidationError(_) => "validation",
            LearnstateError::Conflict(_) => "conflict",
            LearnstateError::NotFound(_) => "not_found",
        }
    }
}

/// Turn UNIQUE/CHECK/FOREIGN KEY failures into a `Conflict` carrying `what`.
/// Every other SQLite error passes through untouched.
pub fn on_constraint(err: rusqlite::Error, what: &str) -> LearnstateError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            LearnstateError::Conflict(what.to_string())
        }
        _ => LearnstateError::RusqliteError(err),
    }
}
