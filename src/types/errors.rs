//! Application error types.
//!
//! All errors use `thiserror` for automatic `Error` trait derivation. The
//! variants mirror the error taxonomy a dispatch/query pipeline can produce;
//! see the module docs on `bus` and `query` for which operations produce
//! which kind.

use std::time::Duration;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the action bus.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// `Ask` targeted a query type with no registered handler.
    #[error("no handler registered for query {0:?}")]
    NoHandler(String),

    /// `Ask` was rejected by the handler's concurrency policy (e.g. `One`
    /// with a request already in flight).
    #[error("query {0:?} rejected by concurrency policy")]
    RejectedByPolicy(String),

    /// A query exceeded its deadline, or was cancelled (handler disposal,
    /// `Latest` eviction).
    #[error("query {0:?} timed out after {1:?}")]
    Timeout(String, Duration),

    /// Use of an already-disposed subscription, stream, or query handler.
    #[error("use of disposed {0}")]
    Disposed(&'static str),

    /// A handler returned an error.
    #[error("handler error: {0}")]
    HandlerError(String),

    /// A handler panicked; the recovered payload has been stringified.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Serialization/deserialization errors (e.g. `OnAction` payload decode).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else — invariant violations, misuse.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn no_handler(query_type: impl Into<String>) -> Self {
        Self::NoHandler(query_type.into())
    }

    pub fn rejected_by_policy(query_type: impl Into<String>) -> Self {
        Self::RejectedByPolicy(query_type.into())
    }

    pub fn timeout(query_type: impl Into<String>, after: Duration) -> Self {
        Self::Timeout(query_type.into(), after)
    }

    pub fn disposed(kind: &'static str) -> Self {
        Self::Disposed(kind)
    }

    pub fn handler_error(msg: impl Into<String>) -> Self {
        Self::HandlerError(msg.into())
    }

    pub fn panic(msg: impl Into<String>) -> Self {
        Self::Panic(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
