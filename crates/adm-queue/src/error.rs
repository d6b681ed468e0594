//! Queue and handler error types.

use std::fmt::Display;

use thiserror::Error;

/// Failure to build or enqueue a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Strict mode: nothing consumes this topic.
    #[error("topic `{0}` has no registered consumer")]
    UnknownTopic(String),

    /// The payload belongs to a different topic than the one requested.
    #[error("payload for topic `{payload}` cannot be published on topic `{topic}`")]
    TopicMismatch {
        /// Requested topic.
        topic: String,
        /// Topic the payload declares.
        payload: String,
    },

    /// The channel is at capacity and the overflow policy is `drop`.
    #[error("queue `{0}` is full; message dropped")]
    Full(String),

    /// The consumer loop has stopped.
    #[error("queue `{0}` is closed")]
    Closed(String),
}

/// Failure reported by a consumer handler. Logged, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Wrap anything displayable.
    pub fn new(message: impl Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
