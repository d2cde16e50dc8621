use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ParleyError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(parley::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(parley::config))]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    #[diagnostic(code(parley::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] crate::authz::errors::AuthzError),

    #[error("Scheduler error: {0}")]
    #[diagnostic(code(parley::scheduler))]
    Scheduler(String),
}

/// Failures of the repository layer, shared by the in-memory and SQL stores.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Database error: {0}")]
    #[diagnostic(code(parley::store::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(parley::store::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Corrupt record `{key}`: {reason}")]
    #[diagnostic(
        code(parley::store::corrupt),
        help("The stored row no longer matches the expected schema; check for manual edits or a missed migration")
    )]
    Corrupt { key: String, reason: String },

    #[error("Record `{0}` already exists")]
    #[diagnostic(code(parley::store::conflict))]
    Conflict(String),
}

impl StoreError {
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
