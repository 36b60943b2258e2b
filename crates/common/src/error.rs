use thiserror::Error;

/// Unified error type for Igloo crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid job settings. Never retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A discovery, count or partition query failed against the database.
    #[error("Execution error: {message} (query: {query})")]
    Execution { query: String, message: String },
    /// An operation was invoked in a state that does not allow it.
    #[error("Invalid state: {0}")]
    State(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn execution(query: impl Into<String>, message: impl ToString) -> Self {
        Error::Execution { query: query.into(), message: message.to_string() }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    /// Only execution failures may succeed when the caller re-plans or
    /// re-reads the partition from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Execution { .. })
    }

    /// The query text attached to an execution failure.
    pub fn query(&self) -> Option<&str> {
        match self {
            Error::Execution { query, .. } => Some(query),
            _ => None,
        }
    }
}
