//! # Models
//!
//! The job aggregate reconciled by the sync service.

pub mod job;

pub use job::{ErrorRecord, Hint, Job, CRASH_ERROR_TYPE, HINT_ERROR_TYPE};
