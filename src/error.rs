//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

/// Message surfaced when a consumer resolves a client outside any provider.
pub const MISSING_CLIENT_MESSAGE: &str = "No QueryClient set, use QueryClientProvider to set one";

// == Producer Error ==
/// Failure reported by an injected query function.
///
/// Stored in the entry state rather than thrown across the cache boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProducerError {
    message: String,
}

impl ProducerError {
    /// Creates a new producer error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ProducerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("failed to serialize query result: {}", err))
    }
}

// == Query Error Enum ==
/// Unified error type for the query cache.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A consumer asked for the current client with no enclosing binding
    #[error("{}", MISSING_CLIENT_MESSAGE)]
    MissingClient,

    /// The query function failed
    #[error("Query failed: {0}")]
    Fetch(#[from] ProducerError),

    /// The entry's state channel closed while a caller was waiting on it
    #[error("Query entry detached: {0}")]
    Detached(String),

    /// A fetch was requested outside a tokio runtime
    #[error("No tokio runtime available to run the query function")]
    NoRuntime,

    /// Cached data could not be decoded into the requested type
    #[error("Failed to decode query data: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, QueryError>;
