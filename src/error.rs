use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before anything reached the store.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid or expired token")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The identity service could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An aggregate could not be refreshed after its raw write committed.
    #[error("aggregate recompute failed: {0}")]
    RecomputeFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }
}
