//! Error types for view operations

/// Errors from the authentication view.
///
/// None of these escape a message exchange: a failing request is logged and
/// left without a response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("UI surface error: {0}")]
    Surface(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Auth(#[from] github_auth::Error),
}

/// Result alias for view operations.
pub type Result<T> = std::result::Result<T, Error>;
