//! # Database
//!
//! Job storage and job-scoped locking, each behind a trait so the sync service
//! never constructs its own backends.

pub mod job_lock;
pub mod job_repository;

pub use job_lock::{
    InProcessLockCoordinator, LockCoordinator, LockError, LockResult, LockToken,
    PgLockCoordinator,
};
pub use job_repository::{
    InMemoryJobRepository, JobRepository, PgJobRepository, RepositoryError, RepositoryResult,
};

/// Embedded schema migrations for the `jobs` and `job_locks` tables
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
