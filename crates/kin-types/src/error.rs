use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("key kind must not be empty")]
    EmptyKind,

    #[error("numeric key id must be positive, got {0}")]
    InvalidNumericId(i64),

    #[error("key name must not be empty")]
    EmptyName,

    #[error("invalid key token: {0}")]
    InvalidToken(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("short blob is {len} bytes, limit is {max}")]
    ShortBlobTooLong { len: usize, max: usize },
}
