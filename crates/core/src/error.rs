//! Unified error types for offcache.
//!
//! Every variant renders with a stable code prefix so callers over MCP can
//! match on it without parsing free text.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offline cache controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown notification id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL, or a URL that cannot be resolved against the app origin.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The named cache generation has been deleted or was never opened.
    #[error("CACHE_ERROR: generation {0} does not exist")]
    GenerationMissing(String),

    /// Stored entry could not be decoded or encoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Transport-level failure talking to the network.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A seed resource could not be fetched; the generation was discarded.
    #[error("INSTALL_FAILED: {path}: {reason}")]
    InstallFailed { path: String, reason: String },

    /// Lifecycle operation attempted from the wrong state.
    #[error("INVALID_STATE: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },
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
            Error::Network(msg) => (-32008, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::InstallFailed { .. } => (-32020, err.to_string()),
            Error::InvalidState { .. } => (-32021, err.to_string()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) | Error::CorruptEntry(msg) => (-32002, msg.clone()),
            Error::GenerationMissing(_) => (-32002, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InstallFailed { path: "/app/app.js".to_string(), reason: "status 404".to_string() };
        assert!(err.to_string().starts_with("INSTALL_FAILED"));
        assert!(err.to_string().contains("/app/app.js"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::Network("connection refused".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32008);
    }

    #[test]
    fn test_invalid_state_keeps_code_in_message() {
        let err = Error::InvalidState { expected: "installed".into(), actual: "parsed".into() };
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32021);
        assert!(mcp_err.message.contains("INVALID_STATE"));
    }
}
