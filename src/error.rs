//! Error taxonomy for the feed engine

use thiserror::Error;

/// Errors produced anywhere in the feed engine.
///
/// None of these are fatal: callers degrade to the last good state and keep
/// retrying in the background.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network failure, timeout or non-success HTTP status on a remote call
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// The remote call succeeded but yielded nothing usable
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// A payload was missing its id or could not be decoded
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// The liked-set store could not be read or written
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration could not be loaded, saved or validated
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::TransientFetch(_))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::InvalidItem(err.to_string())
        } else {
            FeedError::TransientFetch(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
