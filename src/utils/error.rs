//! The `error` module defines the error types used across `relaysub`.
//!
//! `RelayError` is what application code sees. `TransportError` is what a
//! `Transport` implementation reports, and `TopicError` is produced by the
//! topic validator before any network call is made.

use thiserror::Error;

/// Reasons a topic name is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("topic must not contain spaces")]
    ContainsSpace,
    #[error("topic must not contain the '*' wildcard")]
    ContainsWildcard,
    #[error("system topics cannot be published to")]
    SystemTopicPublish,
}

/// Errors reported by the broker transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected to the broker")]
    Disconnected,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error("no responders for subject {0}")]
    NoResponders(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscription error: {0}")]
    Subscription(String),
    #[error("{0}")]
    Other(String),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid credentials: {reason}")]
    InvalidCredentials { reason: String },
    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },
    #[error("not connected")]
    NotConnected,
    #[error("invalid date range: {reason}")]
    InvalidDateRange { reason: String },
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed { topic: String, reason: String },
    #[error("operation timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl From<TransportError> for RelayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => RelayError::Timeout,
            other => RelayError::Transport(other),
        }
    }
}
