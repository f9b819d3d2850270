//! # Orchestration
//!
//! Turns delivered result batches into job state changes.
//!
//! ## Core Components
//!
//! - **MessageRouter**: splits a batch into per-job groups
//! - **JobSynchronizer**: folds one group of worker reports into a job record
//! - **SyncService**: runs the lock-guarded cycle per group and acknowledges the messages

pub mod job_synchronizer;
pub mod message_router;
pub mod sync_service;

pub use job_synchronizer::{CompletionEvent, JobSynchronizer, SyncOutcome};
pub use message_router::{MessageGroup, MessageRouter};
pub use sync_service::{BatchSyncSummary, ResultBatchProcessor, SyncService};
