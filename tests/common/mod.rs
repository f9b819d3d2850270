//! Shared test harness: recording fakes for every collaborator the sync service consumes.

#![allow(dead_code)]

pub mod builders;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use uuid::Uuid;

use hint_sync::config::SyncSettings;
use hint_sync::database::{
    InMemoryJobRepository, InProcessLockCoordinator, JobRepository, LockCoordinator, LockError,
    LockResult, LockToken, RepositoryError, RepositoryResult,
};
use hint_sync::messaging::{
    BatchHandler, MessagingError, MessagingResult, QueuedResult, ResultMessage, ResultQueue,
};
use hint_sync::reporting::{CrashReporter, IssueReport, ReporterError};
use hint_sync::{Job, SyncService};

/// In-memory repository that counts calls and can be told to fail
#[derive(Default)]
pub struct RecordingRepository {
    inner: InMemoryJobRepository,
    pub get_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub fail_get: AtomicBool,
    pub fail_update: AtomicBool,
    /// Behave as if another instance took the lease over before the write
    pub lose_lease: AtomicBool,
    pub update_leases: Mutex<Vec<Uuid>>,
}

impl RecordingRepository {
    pub fn insert(&self, job: Job) {
        self.inner.insert(job);
    }

    pub fn job(&self, job_id: Uuid) -> Job {
        self.inner.snapshot(job_id).expect("job should exist")
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Lease ids passed to `update`, in call order
    pub fn leases(&self) -> Vec<Uuid> {
        self.update_leases.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRepository for RecordingRepository {
    async fn get(&self, job_id: Uuid) -> RepositoryResult<Option<Job>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.get(job_id).await
    }

    async fn update(&self, job: &Job, lease: &LockToken) -> RepositoryResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.update_leases.lock().unwrap().push(lease.lease_id());
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        if self.lose_lease.load(Ordering::SeqCst) {
            return Err(RepositoryError::LeaseLost { job_id: job.id });
        }
        self.inner.update(job, lease).await
    }
}

/// In-process locks that count acquire/release calls
#[derive(Default)]
pub struct RecordingLocks {
    inner: InProcessLockCoordinator,
    pub acquire_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub acquired_leases: Mutex<Vec<Uuid>>,
}

impl RecordingLocks {
    pub fn acquires(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> usize {
        self.inner.held_count()
    }

    /// Lease ids handed out by `acquire`, in call order
    pub fn leases(&self) -> Vec<Uuid> {
        self.acquired_leases.lock().unwrap().clone()
    }
}

#[async_trait]
impl LockCoordinator for RecordingLocks {
    async fn acquire(&self, job_id: Uuid) -> LockResult<LockToken> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(LockError::Contended {
                job_id,
                attempts: 1,
            });
        }
        let token = self.inner.acquire(job_id).await?;
        self.acquired_leases.lock().unwrap().push(token.lease_id());
        Ok(token)
    }

    async fn release(&self, token: LockToken) -> LockResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release(token).await
    }
}

/// Queue that captures the registered handler and records deletions
#[derive(Default)]
pub struct FakeResultQueue {
    handler: Mutex<Option<Arc<dyn BatchHandler>>>,
    next_msg_id: AtomicI64,
    pub listen_calls: AtomicUsize,
    pub deleted: Mutex<Vec<i64>>,
}

impl FakeResultQueue {
    pub fn listens(&self) -> usize {
        self.listen_calls.load(Ordering::SeqCst)
    }

    pub fn deleted_ids(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }

    /// Wrap messages as one delivery with fresh message ids
    pub fn batch(&self, messages: Vec<ResultMessage>) -> Vec<QueuedResult> {
        messages
            .into_iter()
            .map(|message| {
                let msg_id = self.next_msg_id.fetch_add(1, Ordering::SeqCst) + 1;
                QueuedResult::new(msg_id, message)
            })
            .collect()
    }

    /// Hand one batch to the registered handler
    pub async fn deliver(&self, messages: Vec<ResultMessage>) -> Vec<i64> {
        let batch = self.batch(messages);
        let ids = batch.iter().map(|queued| queued.msg_id).collect();

        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .expect("no handler registered");
        handler.handle_batch(batch).await;
        ids
    }
}

#[async_trait]
impl ResultQueue for FakeResultQueue {
    fn queue_name(&self) -> &str {
        "scan_results_test"
    }

    async fn listen(&self, handler: Arc<dyn BatchHandler>) -> MessagingResult<()> {
        self.listen_calls.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.handler.lock().unwrap();
        if slot.is_some() {
            return Err(MessagingError::listener_already_registered(self.queue_name()));
        }
        *slot = Some(handler);
        Ok(())
    }

    async fn delete_message(&self, message: &QueuedResult) -> MessagingResult<()> {
        self.deleted.lock().unwrap().push(message.msg_id);
        Ok(())
    }
}

/// Crash reporter that keeps every report
#[derive(Default)]
pub struct RecordingCrashReporter {
    pub reports: Mutex<Vec<IssueReport>>,
    pub fail: AtomicBool,
}

impl RecordingCrashReporter {
    pub fn reports(&self) -> Vec<IssueReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrashReporter for RecordingCrashReporter {
    async fn report(&self, report: &IssueReport) -> Result<(), ReporterError> {
        self.reports.lock().unwrap().push(report.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReporterError::Delivery {
                job_id: report.job_id,
                reason: "tracker unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Counts ERROR level events
#[derive(Clone, Default)]
pub struct ErrorCounter {
    count: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Route this thread's events through the counter until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A sync service wired to recording fakes
pub struct SyncHarness {
    pub queue: Arc<FakeResultQueue>,
    pub repository: Arc<RecordingRepository>,
    pub locks: Arc<RecordingLocks>,
    pub reporter: Arc<RecordingCrashReporter>,
    pub service: SyncService,
}

impl SyncHarness {
    pub fn new() -> Self {
        let queue = Arc::new(FakeResultQueue::default());
        let repository = Arc::new(RecordingRepository::default());
        let locks = Arc::new(RecordingLocks::default());
        let reporter = Arc::new(RecordingCrashReporter::default());

        let service = SyncService::new(
            queue.clone(),
            repository.clone(),
            locks.clone(),
            reporter.clone(),
            SyncSettings::default(),
        );

        Self {
            queue,
            repository,
            locks,
            reporter,
            service,
        }
    }

    /// Build and register the handler, as the binary does at startup
    pub async fn started() -> Self {
        let harness = Self::new();
        harness
            .service
            .run()
            .await
            .expect("handler registration should succeed");
        harness
    }
}
