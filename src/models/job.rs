//! # Job Model
//!
//! The job aggregate and the hints and crash records it owns.
//!
//! A job is created by the submission side with every hint `pending`. After that it is only
//! ever changed by [`JobSynchronizer`](crate::orchestration::JobSynchronizer) while the job's
//! lock is held, so the type carries no interior mutability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::{HintStatus, JobStatus};

/// `errorType` used for worker crash reports
pub const CRASH_ERROR_TYPE: &str = "crash";

/// `errorType` used when a job failed because a hint resolved to `error`
pub const HINT_ERROR_TYPE: &str = "hint";

/// One scan job and the state of every hint it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    /// Scanned target
    pub url: String,
    pub status: JobStatus,
    /// Earliest start reported by any worker
    pub started: Option<DateTime<Utc>>,
    /// Timestamp of the latest finishing message
    pub finished: Option<DateTime<Utc>>,
    /// Worker crash reports, append-only
    #[serde(default)]
    pub error: Vec<ErrorRecord>,
    #[serde(default)]
    pub hints: Vec<Hint>,
}

impl Job {
    /// Create a freshly submitted job with every hint pending
    pub fn new(id: Uuid, url: impl Into<String>, hint_names: &[&str]) -> Self {
        Self {
            id,
            url: url.into(),
            status: JobStatus::Pending,
            started: None,
            finished: None,
            error: Vec::new(),
            hints: hint_names.iter().map(|name| Hint::pending(*name)).collect(),
        }
    }

    pub fn hint(&self, name: &str) -> Option<&Hint> {
        self.hints.iter().find(|hint| hint.name == name)
    }

    pub fn hint_mut(&mut self, name: &str) -> Option<&mut Hint> {
        self.hints.iter_mut().find(|hint| hint.name == name)
    }

    /// True once no hint is left `pending`
    pub fn all_hints_resolved(&self) -> bool {
        self.hints.iter().all(|hint| !hint.status.is_pending())
    }

    /// True if a worker crashed or any hint resolved to `error`
    pub fn has_errors(&self) -> bool {
        !self.error.is_empty() || self.hints.iter().any(|hint| hint.status.is_error())
    }

    /// Number of hints still waiting on a worker
    pub fn pending_hints(&self) -> usize {
        self.hints
            .iter()
            .filter(|hint| hint.status.is_pending())
            .count()
    }
}

/// One check run against the job's target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub name: String,
    pub status: HintStatus,
    /// Findings reported by the worker, opaque to the sync service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl Hint {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HintStatus::Pending,
            detail: None,
        }
    }
}

/// A worker crash report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Discriminator, e.g. `"crash"`
    #[serde(default = "default_error_type")]
    pub error_type: String,
    pub message: String,
    /// Tail of the worker log, if the worker sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn crash(message: impl Into<String>) -> Self {
        Self {
            error_type: CRASH_ERROR_TYPE.to_string(),
            message: message.into(),
            log: None,
            details: None,
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }
}

fn default_error_type() -> String {
    CRASH_ERROR_TYPE.to_string()
}
