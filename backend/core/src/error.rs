use thiserror::Error;

/// Top-level error type for the catch-up reminder engine.
#[derive(Debug, Error)]
pub enum CatchUpError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid person: {0}")]
    InvalidPerson(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
