#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Hint Sync
//!
//! Keeps scan job records in step with the results their workers publish.
//!
//! ## Overview
//!
//! Scan workers run a set of named analyses ("hints") against a URL and publish progress on a
//! shared results queue: a *started* report, a *finished* report carrying per-hint outcomes, or
//! an *error* report when the worker crashed. This crate consumes that queue and folds every
//! report into the stored job record, so concurrent workers never lose each other's updates.
//!
//! ## Architecture
//!
//! ```text
//! results queue ──batch──▶ MessageRouter ──per job──▶ lock ▸ load ▸ fold ▸ save ▸ report ▸ unlock ▸ ack
//! ```
//!
//! - One lock/read/write cycle per job per batch
//! - A job finalizes to `finished` or `error` once no hint is pending
//! - Crashes and completions are handed to a [`reporting::CrashReporter`]
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`database`] - Job repository and job locks (PostgreSQL and in-memory)
//! - [`messaging`] - Result message wire format and the pgmq results queue
//! - [`models`] - Job, hint and error record types
//! - [`orchestration`] - Batch grouping, the job fold and the sync service
//! - [`reporting`] - Crash and completion reports
//! - [`state_machine`] - Job and hint statuses
//! - [`logging`] - Structured logging setup
//! - [`error`] - Sync cycle errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hint_sync::config::ConfigManager;
//! use hint_sync::database::{PgJobRepository, PgLockCoordinator};
//! use hint_sync::messaging::PgmqResultQueue;
//! use hint_sync::reporting::TracingCrashReporter;
//! use hint_sync::SyncService;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let queue = Arc::new(PgmqResultQueue::new_with_pool(pool.clone(), config.queue.clone()).await);
//! let service = SyncService::new(
//!     queue,
//!     Arc::new(PgJobRepository::new(pool.clone())),
//!     Arc::new(PgLockCoordinator::new(pool, config.lock.clone())),
//!     Arc::new(TracingCrashReporter),
//!     config.sync.clone(),
//! );
//! service.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod reporting;
pub mod state_machine;

pub use config::{ConfigManager, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use models::{ErrorRecord, Hint, Job};
pub use orchestration::{BatchSyncSummary, SyncService};
pub use state_machine::{HintStatus, JobStatus};
