use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ClaimstoneError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(claimstone::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(claimstone::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(claimstone::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(claimstone::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(claimstone::jose))]
    Jose(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(claimstone::not_found))]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(code(claimstone::conflict))]
    Conflict(String),

    #[error("Bad request: {0}")]
    #[diagnostic(code(claimstone::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(claimstone::other))]
    Other(String),
}

impl From<josekit::JoseError> for ClaimstoneError {
    fn from(value: josekit::JoseError) -> Self {
        ClaimstoneError::Jose(value.to_string())
    }
}
