//! Crate-wide error type.
//!
//! Validation and PA verdicts are *data*, not errors (see [`crate::models`]);
//! this enum only covers things that abort the operation that raised them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PkdError {
    #[error("malformed input: {0}")]
    Parse(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("database error: {0}")]
    Database(String),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("duplicate file: sha256 {0} already ingested")]
    DuplicateFile(String),

    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,

    #[error("unauthorised: {0}")]
    Unauthorised(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type PkdResult<T> = Result<T, PkdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let e = PkdError::DuplicateFile("abc123".to_string());
        assert_eq!(
            e.to_string(),
            "duplicate file: sha256 abc123 already ingested"
        );
    }
}
