//! Builders for jobs and worker reports used across the integration tests

use chrono::{DateTime, Utc};
use uuid::Uuid;

use hint_sync::messaging::{HintResult, ResultMessage};
use hint_sync::models::{ErrorRecord, Job};
use hint_sync::state_machine::{HintStatus, JobStatus};

pub const HINTS: [&str; 3] = ["axe", "content-type", "no-vulnerable-javascript-libraries"];

pub fn ts(value: &str) -> DateTime<Utc> {
    value.parse().expect("valid RFC 3339 timestamp")
}

/// Builder pattern for stored jobs
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: Job::new(Uuid::new_v4(), "https://example.com", &HINTS),
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_started(mut self, started: &str) -> Self {
        self.job.started = Some(ts(started));
        self
    }

    pub fn with_crash(mut self, message: &str) -> Self {
        self.job.error.push(ErrorRecord::crash(message));
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

pub fn started(job_id: Uuid, at: &str) -> ResultMessage {
    ResultMessage::started(job_id, ts(at))
}

pub fn finished(job_id: Uuid, at: &str, hints: &[(&str, HintStatus)]) -> ResultMessage {
    let results = hints
        .iter()
        .map(|(name, status)| HintResult::new(*name, *status))
        .collect();
    ResultMessage::finished(job_id, ts(at), results)
}

pub fn all_finished(job_id: Uuid, at: &str) -> ResultMessage {
    let hints: Vec<(&str, HintStatus)> = HINTS.iter().map(|name| (*name, HintStatus::Finished)).collect();
    finished(job_id, at, &hints)
}

pub fn crashed(job_id: Uuid, at: &str, message: &str) -> ResultMessage {
    ResultMessage::crashed(job_id, ts(at), ErrorRecord::crash(message))
}
