//! Transport seams consumed by the sync service.

use async_trait::async_trait;
use std::sync::Arc;

use super::errors::MessagingResult;
use super::message::QueuedResult;

/// Receives every batch the transport delivers
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Handle one delivered batch. Messages the handler wants gone must be
    /// deleted through [`ResultQueue::delete_message`] before returning.
    async fn handle_batch(&self, batch: Vec<QueuedResult>);
}

/// Results queue as seen by the sync service
#[async_trait]
pub trait ResultQueue: Send + Sync {
    /// Name of the underlying queue, for logging
    fn queue_name(&self) -> &str;

    /// Register the single long-lived batch handler.
    ///
    /// Returns once registration completes; deliveries keep flowing to the
    /// handler in the background for the life of the queue.
    async fn listen(&self, handler: Arc<dyn BatchHandler>) -> MessagingResult<()>;

    /// Acknowledge one message as processed
    async fn delete_message(&self, message: &QueuedResult) -> MessagingResult<()>;
}
