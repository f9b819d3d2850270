//! # Job Locks
//!
//! Mutual exclusion scoped to one job id, held for exactly one fold/persist cycle.
//!
//! Every instance of the sync service may receive messages for the same job, so the lock has
//! to be shared across processes. [`PgLockCoordinator`] keeps leases in the `job_locks` table;
//! a lease that outlives its TTL (holder crashed) can be taken over by the next acquirer.
//! [`InProcessLockCoordinator`] serializes within one process only.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::LockConfig;

/// Proof of holding a job lock. Consumed by [`LockCoordinator::release`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LockToken {
    job_id: Uuid,
    lease_id: Uuid,
}

impl LockToken {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            lease_id: Uuid::new_v4(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn lease_id(&self) -> Uuid {
        self.lease_id
    }
}

/// Job-scoped lock backend
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Wait for and take the lock of `job_id`
    async fn acquire(&self, job_id: Uuid) -> LockResult<LockToken>;

    /// Give the lock back
    async fn release(&self, token: LockToken) -> LockResult<()>;
}

/// Errors raised by lock backends
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Lock for job {job_id} still held after {attempts} attempts")]
    Contended { job_id: Uuid, attempts: u32 },

    #[error("Lock for job {job_id} was no longer held at release")]
    NotHeld { job_id: Uuid },

    #[error("Lock backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

pub type LockResult<T> = Result<T, LockError>;

/// Lease table locks shared by every sync service instance on the database
#[derive(Debug, Clone)]
pub struct PgLockCoordinator {
    pool: PgPool,
    config: LockConfig,
}

impl PgLockCoordinator {
    pub fn new(pool: PgPool, config: LockConfig) -> Self {
        Self { pool, config }
    }

    /// One acquire attempt; true when the lease was taken
    async fn try_acquire(&self, token: &LockToken) -> LockResult<bool> {
        let acquired: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO job_locks (job_id, lease_id, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (job_id) DO UPDATE
                SET lease_id = EXCLUDED.lease_id, expires_at = EXCLUDED.expires_at
                WHERE job_locks.expires_at < NOW()
            RETURNING lease_id
            "#,
        )
        .bind(token.job_id)
        .bind(token.lease_id)
        .bind(self.config.ttl().as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.is_some())
    }
}

#[async_trait]
impl LockCoordinator for PgLockCoordinator {
    #[instrument(skip(self))]
    async fn acquire(&self, job_id: Uuid) -> LockResult<LockToken> {
        let token = LockToken::new(job_id);

        for attempt in 1..=self.config.max_attempts {
            if self.try_acquire(&token).await? {
                debug!(attempt = attempt, lease_id = %token.lease_id, "Job lock acquired");
                return Ok(token);
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_interval()).await;
            }
        }

        warn!(
            attempts = self.config.max_attempts,
            "Gave up waiting for job lock"
        );
        Err(LockError::Contended {
            job_id,
            attempts: self.config.max_attempts,
        })
    }

    #[instrument(skip(self, token), fields(job_id = %token.job_id))]
    async fn release(&self, token: LockToken) -> LockResult<()> {
        let result = sqlx::query("DELETE FROM job_locks WHERE job_id = $1 AND lease_id = $2")
            .bind(token.job_id)
            .bind(token.lease_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LockError::NotHeld {
                job_id: token.job_id,
            });
        }

        debug!("Job lock released");
        Ok(())
    }
}

/// Per-job async mutexes; only serializes callers inside this process
#[derive(Debug, Default)]
pub struct InProcessLockCoordinator {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    held: DashMap<Uuid, OwnedMutexGuard<()>>,
}

impl InProcessLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locks currently held
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

#[async_trait]
impl LockCoordinator for InProcessLockCoordinator {
    async fn acquire(&self, job_id: Uuid) -> LockResult<LockToken> {
        // clone out of the map so no shard lock is held across the await
        let mutex = self.locks.entry(job_id).or_default().clone();
        let guard = mutex.lock_owned().await;

        let token = LockToken::new(job_id);
        self.held.insert(token.lease_id, guard);
        Ok(token)
    }

    async fn release(&self, token: LockToken) -> LockResult<()> {
        let Some((_, guard)) = self.held.remove(&token.lease_id) else {
            return Err(LockError::NotHeld {
                job_id: token.job_id,
            });
        };
        drop(guard);

        // forget the mutex once nobody holds or waits on it
        self.locks
            .remove_if(&token.job_id, |_, mutex| Arc::strong_count(mutex) == 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_in_process_lock_serializes_same_job() {
        let coordinator = Arc::new(InProcessLockCoordinator::new());
        let job_id = Uuid::new_v4();

        let first = coordinator.acquire(job_id).await.unwrap();

        let contender = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.acquire(job_id).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        coordinator.release(first).await.unwrap();
        let second = contender.await.unwrap().unwrap();
        assert_eq!(second.job_id(), job_id);

        coordinator.release(second).await.unwrap();
        assert_eq!(coordinator.held_count(), 0);
    }

    #[tokio::test]
    async fn test_in_process_lock_independent_jobs() {
        let coordinator = InProcessLockCoordinator::new();

        let a = coordinator.acquire(Uuid::new_v4()).await.unwrap();
        let b = coordinator.acquire(Uuid::new_v4()).await.unwrap();
        assert_eq!(coordinator.held_count(), 2);

        coordinator.release(a).await.unwrap();
        coordinator.release(b).await.unwrap();
        assert_eq!(coordinator.held_count(), 0);
    }

    #[tokio::test]
    async fn test_release_of_unknown_token_fails() {
        let coordinator = InProcessLockCoordinator::new();
        let stray = LockToken::new(Uuid::new_v4());

        assert!(matches!(
            coordinator.release(stray).await,
            Err(LockError::NotHeld { .. })
        ));
    }
}
