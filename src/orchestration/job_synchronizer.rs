//! # Job Synchronizer
//!
//! Folds an ordered group of worker reports into a job snapshot.
//!
//! ## State machine
//!
//! - `started` refines the job's start time to the earliest report seen and moves a `pending`
//!   job to `started`. It never touches a job that is already past `pending`.
//! - `finished` overwrites the named hints and the finish time, then finalizes the job once no
//!   hint is left `pending`: `error` if any worker crashed or any hint failed, `finished`
//!   otherwise.
//! - `error` (a worker crash) appends the crash record and the finish time. It does not change
//!   the status; a later finalization sees the record and picks `error`.
//!
//! The fold is pure: it owns the working copy for its duration and hands back the new
//! snapshot plus the events the caller should report.

use tracing::{debug, warn};

use crate::messaging::{HintResult, ResultMessage, ResultPayload};
use crate::models::{ErrorRecord, Job, HINT_ERROR_TYPE};
use crate::state_machine::JobStatus;
use chrono::{DateTime, Utc};

/// Emitted when a fold finalized the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub status: JobStatus,
    /// Only set when `status` is `error`
    pub error_type: Option<String>,
}

/// Result of folding one message group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    /// Folded snapshot, `None` when the job does not exist
    pub job: Option<Job>,
    /// One crash record per `error` report folded, in order
    pub crash_events: Vec<ErrorRecord>,
    /// Last finalization triggered by the group, if any
    pub completion: Option<CompletionEvent>,
}

impl SyncOutcome {
    pub fn is_not_found(&self) -> bool {
        self.job.is_none()
    }
}

/// Applies worker reports to a job
#[derive(Debug, Clone, Copy, Default)]
pub struct JobSynchronizer;

impl JobSynchronizer {
    pub fn new() -> Self {
        Self
    }

    /// Fold `messages` left to right into `current`.
    ///
    /// An absent job yields an empty outcome; the caller decides how to record that.
    pub fn apply<'a, I>(&self, current: Option<Job>, messages: I) -> SyncOutcome
    where
        I: IntoIterator<Item = &'a ResultMessage>,
    {
        let Some(mut job) = current else {
            return SyncOutcome::default();
        };

        let mut crash_events = Vec::new();
        let mut completion = None;

        for message in messages {
            if message.job_id != job.id {
                warn!(
                    job_id = %job.id,
                    message_job_id = %message.job_id,
                    "Skipping result addressed to another job"
                );
                continue;
            }

            match &message.payload {
                ResultPayload::Started { started } => apply_started(&mut job, *started),
                ResultPayload::Finished { finished, hints } => {
                    if let Some(event) = apply_finished(&mut job, *finished, hints) {
                        completion = Some(event);
                    }
                }
                ResultPayload::Error { finished, error } => {
                    apply_crash(&mut job, *finished, error);
                    crash_events.push(error.clone());
                }
            }
        }

        SyncOutcome {
            job: Some(job),
            crash_events,
            completion,
        }
    }
}

fn apply_started(job: &mut Job, started: DateTime<Utc>) {
    job.started = Some(match job.started {
        Some(existing) => existing.min(started),
        None => started,
    });

    if job.status == JobStatus::Pending {
        job.status = JobStatus::Started;
    }

    debug!(job_id = %job.id, status = %job.status, "Applied started report");
}

fn apply_finished(
    job: &mut Job,
    finished: DateTime<Utc>,
    results: &[HintResult],
) -> Option<CompletionEvent> {
    for result in results {
        match job.hint_mut(&result.name) {
            Some(hint) => {
                hint.status = result.status;
                hint.detail = result.detail.clone();
            }
            None => warn!(
                job_id = %job.id,
                hint = %result.name,
                "Ignoring result for a hint the job does not have"
            ),
        }
    }
    job.finished = Some(finished);

    if !job.all_hints_resolved() {
        debug!(
            job_id = %job.id,
            pending_hints = job.pending_hints(),
            "Partial results applied"
        );
        return None;
    }

    let event = if job.has_errors() {
        let error_type = job
            .error
            .last()
            .map(|record| record.error_type.clone())
            .unwrap_or_else(|| HINT_ERROR_TYPE.to_string());
        CompletionEvent {
            status: JobStatus::Error,
            error_type: Some(error_type),
        }
    } else {
        CompletionEvent {
            status: JobStatus::Finished,
            error_type: None,
        }
    };
    job.status = event.status;

    debug!(job_id = %job.id, status = %job.status, "Job finalized");
    Some(event)
}

fn apply_crash(job: &mut Job, finished: DateTime<Utc>, record: &ErrorRecord) {
    job.error.push(record.clone());
    job.finished = Some(finished);

    debug!(
        job_id = %job.id,
        error_type = %record.error_type,
        crashes = job.error.len(),
        "Applied worker crash"
    );
}
