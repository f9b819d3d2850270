//! # Sync Service
//!
//! ## Architecture: Lock-Guarded Fold Cycles Over Result Batches
//!
//! The SyncService registers one batch handler on the results queue. Every delivered batch is
//! grouped by job and each group runs one cycle:
//!
//! acquire job lock → load job → fold → persist → report → release lock → acknowledge
//!
//! ## Key Features
//!
//! - **One cycle per job per batch**: same-job messages share a single lock/read/write
//! - **Guaranteed release**: the lock is released on every exit path once acquired
//! - **Fenced writes**: the persist step carries the lock token, so a cycle whose lease expired
//!   and was taken over fails its write instead of overwriting the new holder's
//! - **Isolated failures**: a failing cycle leaves its messages unacknowledged for redelivery
//!   and never affects sibling groups or the listener
//! - **Bounded concurrency**: groups of one batch run concurrently up to
//!   `sync.max_concurrent_groups`
//!
//! ## Acknowledgement policy
//!
//! Messages are deleted only after their cycle succeeded. A job that does not exist counts as
//! success: the messages are dropped so they do not come back forever. Lock or repository
//! failures leave the group on the queue.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hint_sync::config::SyncSettings;
//! use hint_sync::database::{InMemoryJobRepository, InProcessLockCoordinator};
//! use hint_sync::messaging::ResultQueue;
//! use hint_sync::orchestration::SyncService;
//! use hint_sync::reporting::TracingCrashReporter;
//! use std::sync::Arc;
//!
//! # async fn example(queue: Arc<dyn ResultQueue>) -> Result<(), Box<dyn std::error::Error>> {
//! let service = SyncService::new(
//!     queue,
//!     Arc::new(InMemoryJobRepository::new()),
//!     Arc::new(InProcessLockCoordinator::new()),
//!     Arc::new(TracingCrashReporter),
//!     SyncSettings::default(),
//! );
//!
//! // returns once the handler is registered; batches keep flowing in the background
//! service.run().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::database::{JobRepository, LockCoordinator, LockToken};
use crate::error::SyncResult;
use crate::messaging::{BatchHandler, QueuedResult, ResultQueue};
use crate::orchestration::job_synchronizer::{JobSynchronizer, SyncOutcome};
use crate::orchestration::message_router::{MessageGroup, MessageRouter};
use crate::reporting::{CrashReporter, IssueReport};
use crate::state_machine::JobStatus;

/// Totals for one processed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSyncSummary {
    /// Messages in the delivered batch
    pub messages_received: usize,
    /// Groups whose job was folded and persisted
    pub groups_synced: usize,
    /// Groups whose job did not exist
    pub groups_not_found: usize,
    /// Groups whose cycle failed and stay on the queue
    pub groups_failed: usize,
    pub messages_acknowledged: usize,
    /// Jobs that reached `finished` in this batch
    pub jobs_finished: usize,
    /// Jobs that reached `error` in this batch
    pub jobs_errored: usize,
    pub crashes_reported: usize,
    pub processing_duration_ms: u64,
}

impl BatchSyncSummary {
    fn record(&mut self, outcome: &SyncResult<GroupOutcome>) {
        match outcome {
            Ok(GroupOutcome::NotFound { acknowledged }) => {
                self.groups_not_found += 1;
                self.messages_acknowledged += acknowledged;
            }
            Ok(GroupOutcome::Synced {
                finalized,
                crashes,
                acknowledged,
            }) => {
                self.groups_synced += 1;
                self.messages_acknowledged += acknowledged;
                self.crashes_reported += crashes;
                match finalized {
                    Some(JobStatus::Finished) => self.jobs_finished += 1,
                    Some(JobStatus::Error) => self.jobs_errored += 1,
                    _ => {}
                }
            }
            Err(_) => self.groups_failed += 1,
        }
    }
}

/// What one group cycle did
#[derive(Debug, Clone, PartialEq)]
enum GroupOutcome {
    NotFound {
        acknowledged: usize,
    },
    Synced {
        finalized: Option<JobStatus>,
        crashes: usize,
        acknowledged: usize,
    },
}

impl GroupOutcome {
    fn with_acknowledged(self, count: usize) -> Self {
        match self {
            Self::NotFound { .. } => Self::NotFound {
                acknowledged: count,
            },
            Self::Synced {
                finalized, crashes, ..
            } => Self::Synced {
                finalized,
                crashes,
                acknowledged: count,
            },
        }
    }
}

/// Runs the per-group sync cycles for delivered batches
pub struct ResultBatchProcessor {
    queue: Arc<dyn ResultQueue>,
    repository: Arc<dyn JobRepository>,
    locks: Arc<dyn LockCoordinator>,
    reporter: Arc<dyn CrashReporter>,
    router: MessageRouter,
    synchronizer: JobSynchronizer,
    settings: SyncSettings,
}

impl ResultBatchProcessor {
    pub fn new(
        queue: Arc<dyn ResultQueue>,
        repository: Arc<dyn JobRepository>,
        locks: Arc<dyn LockCoordinator>,
        reporter: Arc<dyn CrashReporter>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            queue,
            repository,
            locks,
            reporter,
            router: MessageRouter::new(),
            synchronizer: JobSynchronizer::new(),
            settings,
        }
    }

    /// Group a batch and run one cycle per job
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    pub async fn process_batch(&self, batch: Vec<QueuedResult>) -> BatchSyncSummary {
        let started = Instant::now();
        let mut summary = BatchSyncSummary {
            messages_received: batch.len(),
            ..Default::default()
        };

        let groups = self.router.group(batch);
        debug!(group_count = groups.len(), "Batch grouped by job");

        let outcomes: Vec<(Uuid, i32, SyncResult<GroupOutcome>)> = stream::iter(groups)
            .map(|group| async move {
                let job_id = group.job_id;
                let deliveries = group.max_read_count();
                (job_id, deliveries, self.process_group(group).await)
            })
            .buffer_unordered(self.settings.max_concurrent_groups.max(1))
            .collect()
            .await;

        for (job_id, deliveries, outcome) in &outcomes {
            if let Err(e) = outcome {
                error!(
                    job_id = %job_id,
                    deliveries = deliveries,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Sync cycle failed, messages left for redelivery"
                );
            }
            summary.record(outcome);
        }

        summary.processing_duration_ms = started.elapsed().as_millis() as u64;
        summary
    }

    /// One lock-guarded cycle for one job
    #[instrument(skip(self, group), fields(job_id = %group.job_id, messages = group.len()))]
    async fn process_group(&self, group: MessageGroup) -> SyncResult<GroupOutcome> {
        let token = self.locks.acquire(group.job_id).await?;

        let result = self.sync_job(&group, &token).await;

        if let Err(e) = self.locks.release(token).await {
            error!(error = %e, "Failed to release job lock, lease will expire");
        }

        let outcome = result?;
        let acknowledged = self.acknowledge(&group).await;
        Ok(outcome.with_acknowledged(acknowledged))
    }

    /// Load, fold, persist and report; runs while the job lock is held
    async fn sync_job(
        &self,
        group: &MessageGroup,
        lease: &LockToken,
    ) -> SyncResult<GroupOutcome> {
        let current = self.repository.get(group.job_id).await?;

        let SyncOutcome {
            job,
            crash_events,
            completion,
        } = self.synchronizer.apply(current, group.results());

        let Some(job) = job else {
            error!(job_id = %group.job_id, "Job not found in database");
            return Ok(GroupOutcome::NotFound { acknowledged: 0 });
        };

        self.repository.update(&job, lease).await?;

        for record in &crash_events {
            self.report(IssueReport::crash(&job, record)).await;
        }
        if let Some(event) = &completion {
            self.report(IssueReport::completion(
                &job,
                event.status,
                event.error_type.clone(),
            ))
            .await;
        }

        info!(
            status = %job.status,
            pending_hints = job.pending_hints(),
            crashes = crash_events.len(),
            finalized = completion.is_some(),
            "Job synchronized"
        );

        Ok(GroupOutcome::Synced {
            finalized: completion.map(|event| event.status),
            crashes: crash_events.len(),
            acknowledged: 0,
        })
    }

    async fn report(&self, report: IssueReport) {
        if let Err(e) = self.reporter.report(&report).await {
            warn!(job_id = %report.job_id, error = %e, "Issue report not delivered");
        }
    }

    /// Delete the group's messages; returns how many were deleted
    async fn acknowledge(&self, group: &MessageGroup) -> usize {
        let mut acknowledged = 0;
        for message in &group.messages {
            match self.queue.delete_message(message).await {
                Ok(()) => acknowledged += 1,
                Err(e) => warn!(
                    msg_id = message.msg_id,
                    error = %e,
                    "Failed to delete processed result message"
                ),
            }
        }
        acknowledged
    }
}

#[async_trait]
impl BatchHandler for ResultBatchProcessor {
    async fn handle_batch(&self, batch: Vec<QueuedResult>) {
        let summary = self.process_batch(batch).await;

        info!(
            messages = summary.messages_received,
            synced = summary.groups_synced,
            not_found = summary.groups_not_found,
            failed = summary.groups_failed,
            acknowledged = summary.messages_acknowledged,
            finished = summary.jobs_finished,
            errored = summary.jobs_errored,
            duration_ms = summary.processing_duration_ms,
            "Completed result batch"
        );
    }
}

/// Wires the results queue to the batch processor
pub struct SyncService {
    queue: Arc<dyn ResultQueue>,
    processor: Arc<ResultBatchProcessor>,
}

impl SyncService {
    /// Build the service from injected collaborators
    pub fn new(
        queue: Arc<dyn ResultQueue>,
        repository: Arc<dyn JobRepository>,
        locks: Arc<dyn LockCoordinator>,
        reporter: Arc<dyn CrashReporter>,
        settings: SyncSettings,
    ) -> Self {
        let processor = Arc::new(ResultBatchProcessor::new(
            queue.clone(),
            repository,
            locks,
            reporter,
            settings,
        ));
        Self { queue, processor }
    }

    /// Register the batch handler on the results queue.
    ///
    /// Returns once registration completes; batch handling continues in the background.
    pub async fn run(&self) -> SyncResult<()> {
        let handler: Arc<dyn BatchHandler> = self.processor.clone();
        self.queue.listen(handler).await?;

        info!(queue = %self.queue.queue_name(), "Sync service listening for results");
        Ok(())
    }

    /// The processor registered by [`run`](Self::run)
    pub fn processor(&self) -> &Arc<ResultBatchProcessor> {
        &self.processor
    }
}
