//! Error types shared by the adapters and the aggregation engine.

use std::time::Duration;
use thiserror::Error;

/// A patient identifier that cannot be queried.
///
/// Raised before any backend or cache access and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("patient name must be at least {min} characters after trimming, got {len}")]
    TooShort { len: usize, min: usize },
}

/// A failure talking to one backend.
///
/// The engine records these per section; they never abort a profile build.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("query rejected: {0}")]
    Query(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not configured: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether another connection attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Config(_))
    }
}
