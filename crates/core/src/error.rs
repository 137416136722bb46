//! Unified error types for shulboard.

use tokio_rusqlite::rusqlite;

/// Unified error types shared by the gateway and the content backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a malformed entity name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A URL could not be parsed or rebased onto the board origin.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No document exists for the given entity/id pair.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Store operation failed.
    #[error("STORE_ERROR: {0}")]
    Store(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored document body is not valid JSON.
    #[error("STORE_ERROR: corrupt document: {0}")]
    CorruptDocument(String),

    /// The upstream origin could not be reached.
    #[error("UPSTREAM_UNREACHABLE: {0}")]
    UpstreamUnreachable(String),

    /// Upstream response body exceeded the configured size cap.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Navigation fallback failed: no app shell in the static tier.
    #[error("SHELL_UNAVAILABLE: {0}")]
    ShellUnavailable(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Store(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Store(tokio_rusqlite::Error::Close(c)),
            _ => Error::Store(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Store(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("messages/abc123".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("messages/abc123"));
    }

    #[test]
    fn test_upstream_error_display() {
        let err = Error::UpstreamUnreachable("connection refused".to_string());
        assert!(err.to_string().starts_with("UPSTREAM_UNREACHABLE"));
    }
}
