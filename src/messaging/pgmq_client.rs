//! # PostgreSQL Message Queue Results Queue (pgmq-rs)
//!
//! [`ResultQueue`] backed by a pgmq queue. A background tokio task polls the queue and hands
//! each decoded batch to the registered handler; payloads that do not decode are archived so
//! they never reach the handler and never come back.

use async_trait::async_trait;
use pgmq::{types::Message, PGMQueue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::errors::{MessagingError, MessagingResult};
use super::message::{QueuedResult, ResultMessage};
use super::traits::{BatchHandler, ResultQueue};
use crate::config::QueueConfig;

/// pgmq-rs based results queue
pub struct PgmqResultQueue {
    pgmq: PGMQueue,
    config: QueueConfig,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PgmqResultQueue {
    /// Create a results queue on an existing connection pool (BYOP - Bring Your Own Pool)
    pub async fn new_with_pool(pool: sqlx::PgPool, config: QueueConfig) -> Self {
        info!(queue = %config.name, "Creating pgmq results queue with shared pool");

        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self {
            pgmq,
            config,
            listener: Mutex::new(None),
        }
    }

    /// Stop the polling task, if one is running
    pub fn stop_listening(&self) {
        if let Some(handle) = self.lock_listener().take() {
            handle.abort();
            info!(queue = %self.config.name, "Stopped results queue listener");
        }
    }

    async fn ensure_queue_exists(&self) {
        if let Err(e) = self.pgmq.create(&self.config.name).await {
            debug!(
                queue = %self.config.name,
                error = %e,
                "Results queue may already exist"
            );
        }
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn poll_loop(pgmq: PGMQueue, config: QueueConfig, handler: Arc<dyn BatchHandler>) {
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        loop {
            match read_batch(&pgmq, &config).await {
                Ok(batch) if batch.is_empty() => tokio::time::sleep(poll_interval).await,
                Ok(batch) => {
                    debug!(
                        queue = %config.name,
                        message_count = batch.len(),
                        "Delivering result batch"
                    );
                    handler.handle_batch(batch).await;
                }
                Err(e) => {
                    error!(queue = %config.name, error = %e, "Failed to read result batch");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

/// Read one batch and decode it, archiving anything that is not a result message
async fn read_batch(pgmq: &PGMQueue, config: &QueueConfig) -> MessagingResult<Vec<QueuedResult>> {
    let messages: Vec<Message<serde_json::Value>> = pgmq
        .read_batch(
            &config.name,
            Some(config.visibility_timeout_seconds),
            config.batch_size,
        )
        .await
        .map_err(|e| MessagingError::queue_operation(&config.name, "read_batch", e.to_string()))?
        .unwrap_or_default();

    let mut batch = Vec::with_capacity(messages.len());
    for message in messages {
        match decode(message.message) {
            Ok(decoded) => batch.push(QueuedResult {
                msg_id: message.msg_id,
                read_count: message.read_ct,
                message: decoded,
            }),
            Err(e) => {
                warn!(
                    queue = %config.name,
                    msg_id = message.msg_id,
                    error = %e,
                    "Archiving undecodable result message"
                );
                if let Err(archive_err) = pgmq.archive(&config.name, message.msg_id).await {
                    warn!(
                        msg_id = message.msg_id,
                        error = %archive_err,
                        "Failed to archive undecodable result message"
                    );
                }
            }
        }
    }

    Ok(batch)
}

/// Decode one queue payload into a result message
fn decode(payload: serde_json::Value) -> MessagingResult<ResultMessage> {
    Ok(ResultMessage::from_json(payload)?)
}

#[async_trait]
impl ResultQueue for PgmqResultQueue {
    fn queue_name(&self) -> &str {
        &self.config.name
    }

    async fn listen(&self, handler: Arc<dyn BatchHandler>) -> MessagingResult<()> {
        self.ensure_queue_exists().await;

        let mut listener = self.lock_listener();
        if listener.is_some() {
            return Err(MessagingError::listener_already_registered(
                &self.config.name,
            ));
        }

        let handle = tokio::spawn(Self::poll_loop(
            self.pgmq.clone(),
            self.config.clone(),
            handler,
        ));
        *listener = Some(handle);

        info!(
            queue = %self.config.name,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "Listening for result messages"
        );
        Ok(())
    }

    async fn delete_message(&self, message: &QueuedResult) -> MessagingResult<()> {
        self.pgmq
            .delete(&self.config.name, message.msg_id)
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&self.config.name, "delete", e.to_string())
            })?;

        debug!(msg_id = message.msg_id, "Result message deleted");
        Ok(())
    }
}

impl Drop for PgmqResultQueue {
    fn drop(&mut self) {
        self.stop_listening();
    }
}
