//! Error taxonomy shared by the analyze and chat pipelines.
//!
//! Library code returns [`CompanionError`]; the CLI wraps it in `anyhow`
//! and the HTTP server maps it onto status codes (see `server.rs`).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// Bad repository URL, network or authentication failure while cloning.
    #[error("failed to clone {url}: {message}")]
    Clone { url: String, message: String },

    /// A single file could not be read or decoded. The loader records these
    /// in its report instead of aborting.
    #[error("failed to read {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },

    /// The request cannot be served in the current state (e.g. chat before
    /// any repository was analyzed).
    #[error("{0}")]
    Precondition(String),

    /// Malformed request input (empty question, empty URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding or generation backend failure.
    #[error("{provider} error: {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    /// The generative model did not answer within the configured timeout.
    #[error("{provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// The index location has never been (completely) built.
    #[error("index not found at {0}")]
    NotFound(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CompanionError>;

impl CompanionError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Timeouts, rate limits, 5xx and connection failures are retryable;
    /// malformed requests and local failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CompanionError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .is_some_and(|s| s.as_u16() == 429 || s.is_server_error());
        Self::provider("http", err.to_string(), retryable)
    }
}
