//! # Job Repository
//!
//! Read/write access to job records. The sync service only ever loads one job by id and writes
//! the folded snapshot back; creating jobs belongs to the submission side.
//!
//! Writes are fenced by the job lock: `update` takes the caller's [`LockToken`] and refuses to
//! write once that lease is no longer the current one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::job_lock::LockToken;
use crate::models::{ErrorRecord, Hint, Job};
use crate::state_machine::JobStatus;

/// Job storage interface
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Load a job, `None` when no such job exists
    async fn get(&self, job_id: Uuid) -> RepositoryResult<Option<Job>>;

    /// Persist a folded job snapshot while `lease` still holds the job lock
    async fn update(&self, job: &Job, lease: &LockToken) -> RepositoryResult<()>;
}

/// Errors raised by job storage
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt job record {job_id}: {reason}")]
    CorruptRecord { job_id: Uuid, reason: String },

    #[error("Job {0} disappeared before it could be updated")]
    UpdateTargetMissing(Uuid),

    #[error("Lease on job {job_id} was lost before the write")]
    LeaseLost { job_id: Uuid },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Postgres job storage; hints and crash records live in JSONB columns
#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    url: String,
    status: String,
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    error: Json<Vec<ErrorRecord>>,
    hints: Json<Vec<Hint>>,
}

impl TryFrom<JobRow> for Job {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|reason| RepositoryError::CorruptRecord {
                job_id: row.job_id,
                reason,
            })?;

        Ok(Job {
            id: row.job_id,
            url: row.url,
            status,
            started: row.started,
            finished: row.finished,
            error: row.error.0,
            hints: row.hints.0,
        })
    }
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A lease only ever covers the job it was taken for
fn check_lease(job: &Job, lease: &LockToken) -> RepositoryResult<()> {
    if lease.job_id() != job.id {
        return Err(RepositoryError::LeaseLost { job_id: job.id });
    }
    Ok(())
}

#[async_trait]
impl JobRepository for PgJobRepository {
    #[instrument(skip(self))]
    async fn get(&self, job_id: Uuid) -> RepositoryResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, url, status, started, finished, error, hints
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    #[instrument(skip(self, job, lease), fields(job_id = %job.id, status = %job.status))]
    async fn update(&self, job: &Job, lease: &LockToken) -> RepositoryResult<()> {
        check_lease(job, lease)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, started = $3, finished = $4, error = $5, hints = $6,
                updated_at = NOW()
            WHERE job_id = $1
              AND EXISTS (
                  SELECT 1 FROM job_locks
                  WHERE job_locks.job_id = $1
                    AND job_locks.lease_id = $7
                    AND job_locks.expires_at > NOW()
              )
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(job.started)
        .bind(job.finished)
        .bind(Json(&job.error))
        .bind(Json(&job.hints))
        .bind(lease.lease_id())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // tell a vanished job apart from a lease taken over by another instance
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM jobs WHERE job_id = $1)")
                    .bind(job.id)
                    .fetch_one(&self.pool)
                    .await?;

            return Err(if exists {
                warn!(lease_id = %lease.lease_id(), "Job lease expired before the write");
                RepositoryError::LeaseLost { job_id: job.id }
            } else {
                RepositoryError::UpdateTargetMissing(job.id)
            });
        }

        debug!("Job record updated");
        Ok(())
    }
}

/// In-process job storage for local runs and tests
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a job as the submission side would
    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    /// Current stored snapshot of a job
    pub fn snapshot(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.get(&job_id).map(|job| job.clone())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get(&self, job_id: Uuid) -> RepositoryResult<Option<Job>> {
        Ok(self.snapshot(job_id))
    }

    async fn update(&self, job: &Job, lease: &LockToken) -> RepositoryResult<()> {
        check_lease(job, lease)?;

        match self.jobs.get_mut(&job.id) {
            Some(mut stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::UpdateTargetMissing(job.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::HintStatus;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let repository = InMemoryJobRepository::new();
        let mut job = Job::new(Uuid::new_v4(), "https://example.com", &["axe"]);
        repository.insert(job.clone());

        job.status = JobStatus::Started;
        job.hints[0].status = HintStatus::Processing;
        repository
            .update(&job, &LockToken::new(job.id))
            .await
            .unwrap();

        let stored = repository.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn test_in_memory_missing_job() {
        let repository = InMemoryJobRepository::new();
        let job = Job::new(Uuid::new_v4(), "https://example.com", &[]);

        assert!(repository.get(job.id).await.unwrap().is_none());
        assert!(matches!(
            repository.update(&job, &LockToken::new(job.id)).await,
            Err(RepositoryError::UpdateTargetMissing(id)) if id == job.id
        ));
    }

    #[test]
    fn test_corrupt_status_is_rejected() {
        let row = JobRow {
            job_id: Uuid::new_v4(),
            url: "https://example.com".to_string(),
            status: "in_progress".to_string(),
            started: None,
            finished: None,
            error: Json(Vec::new()),
            hints: Json(Vec::new()),
        };

        assert!(matches!(
            Job::try_from(row),
            Err(RepositoryError::CorruptRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_refuses_lease_of_another_job() {
        let repository = InMemoryJobRepository::new();
        let mut job = Job::new(Uuid::new_v4(), "https://example.com", &["axe"]);
        repository.insert(job.clone());

        job.status = JobStatus::Started;
        let foreign = LockToken::new(Uuid::new_v4());

        assert!(matches!(
            repository.update(&job, &foreign).await,
            Err(RepositoryError::LeaseLost { job_id }) if job_id == job.id
        ));
        assert_eq!(
            repository.snapshot(job.id).unwrap().status,
            JobStatus::Pending
        );
    }
}
