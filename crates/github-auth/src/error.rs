//! Error types for token handshake operations

/// Errors from token persistence.
///
/// Validation and the popup flow never fail: rejection, network errors and
/// timeouts are ordinary outcomes of those operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
