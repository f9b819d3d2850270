//! # Messaging Error Types
//!
//! Error types for the results queue, using thiserror for structured variants
//! instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Results queue error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Listener already registered for queue: {queue_name}")]
    ListenerAlreadyRegistered { queue_name: String },
}

impl MessagingError {
    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn listener_already_registered(queue_name: impl Into<String>) -> Self {
        Self::ListenerAlreadyRegistered {
            queue_name: queue_name.into(),
        }
    }
}

/// Queue payloads are only ever decoded, never encoded, on this side
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::message_deserialization(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
