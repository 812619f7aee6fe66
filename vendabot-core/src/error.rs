// vendabot-core/src/error.rs

use thiserror::Error;
use uuid::Uuid;

use crate::models::QuestionStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The connection's credentials could not be refreshed and it has been
    /// deactivated. Fatal for the current question only, never the process.
    #[error("Authorization expired for connection {0}")]
    AuthExpired(Uuid),

    #[error("Marketplace API error: {0}")]
    Marketplace(String),

    #[error("Messaging gateway error: {0}")]
    Messaging(String),

    #[error("LLM gateway error: {0}")]
    Llm(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: QuestionStatus,
        to: QuestionStatus,
    },

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Llm(e.to_string())
    }
}
