//! Unified error types for shelter.
//!
//! Display strings carry an upper-case code prefix so log lines and tool
//! errors can be matched without parsing the message.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cache proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown method name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No cache entry found for the given request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Only 2xx responses may be stored.
    #[error("NOT_CACHEABLE: status {0}")]
    NotCacheable(u16),

    /// The target generation was deleted (or never opened).
    #[error("GENERATION_CLOSED: {0}")]
    GenerationClosed(String),

    /// A manifest resource could not be fetched or stored during install.
    #[error("PRECACHE_FAILED: {url}: {reason}")]
    PrecacheFailure { url: String, reason: String },

    /// Transport-level failure talking to the origin.
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// Response body exceeded the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A lifecycle hook was called from a state that does not allow it.
    #[error("INVALID_STATE: cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: String },
}

impl Error {
    /// Whether this error came from the transport rather than the store.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::NetworkFailure(_) | Error::FetchTooLarge(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::NotCacheable(_) | Error::GenerationClosed(_) => (-32002, err.to_string()),
            Error::PrecacheFailure { .. } => (-32004, err.to_string()),
            Error::NetworkFailure(msg) => (-32005, msg.clone()),
            Error::FetchTooLarge(msg) => (-32006, msg.clone()),
            Error::InvalidState { .. } => (-32007, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
