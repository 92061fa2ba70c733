//! Error types
//!
//! Two failure classes: [`StoreError`] is fatal or store-level, [`HandlerError`]
//! is a failure isolated at an effect, method or reducer boundary.

use thiserror::Error;

/// Failure raised by a user-supplied handler (effect, mailbox method, reducer)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Reducers fail with the same shape; a reducer failure halts the store.
pub type ReducerError = HandlerError;

/// Store-level errors returned from dispatch and registration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A reducer failed while projecting this action. The store is now halted.
    #[error("reducer failed on `{action}`: {source}")]
    Reducer {
        action: String,
        #[source]
        source: ReducerError,
    },
    /// A reducer failed earlier; no further actions are projected.
    #[error("store halted after a reducer failure")]
    Halted,
    /// Nested dispatch went deeper than the configured limit.
    #[error("dispatch depth {depth} exceeded limit {limit} at `{action}`")]
    DepthExceeded {
        action: String,
        depth: usize,
        limit: usize,
    },
    /// A declarative response mapping could not be read.
    #[error("invalid response mapping: {0}")]
    InvalidResponses(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl StoreError {
    /// Whether the store can no longer accept actions
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Reducer { .. } | Self::Halted)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}
