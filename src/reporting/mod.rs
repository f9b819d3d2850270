//! # Issue Reporting
//!
//! Crash and completion summaries handed to the issue tracker. A crash report opens (or
//! updates) an issue for the scanned target; a clean completion report lets the tracker close
//! it again. Delivery is best effort: the sync service logs reporter failures and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ErrorRecord, Job};
use crate::state_machine::JobStatus;

/// Log target used by [`TracingCrashReporter`]
pub const ISSUE_LOG_TARGET: &str = "hint_sync::issues";

/// Summary of one crash or one job completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    pub job_id: Uuid,
    pub url: String,
    /// When the scan the report is about ended
    pub scan: DateTime<Utc>,
    pub status: JobStatus,
    /// Set for crashes and failed completions only
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub log: Option<String>,
}

impl IssueReport {
    /// Report for one worker crash
    pub fn crash(job: &Job, record: &ErrorRecord) -> Self {
        Self {
            job_id: job.id,
            url: job.url.clone(),
            scan: job.finished.unwrap_or_else(Utc::now),
            status: job.status,
            error_type: Some(record.error_type.clone()),
            error_message: Some(record.message.clone()),
            log: record.log.clone(),
        }
    }

    /// Report for a job that just finalized
    pub fn completion(job: &Job, status: JobStatus, error_type: Option<String>) -> Self {
        Self {
            job_id: job.id,
            url: job.url.clone(),
            scan: job.finished.unwrap_or_else(Utc::now),
            status,
            error_type,
            error_message: None,
            log: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_type.is_some()
    }
}

/// Errors raised while delivering a report
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error("Failed to deliver issue report for job {job_id}: {reason}")]
    Delivery { job_id: Uuid, reason: String },
}

/// Sink for crash and completion summaries
#[async_trait]
pub trait CrashReporter: Send + Sync {
    async fn report(&self, report: &IssueReport) -> Result<(), ReporterError>;
}

/// Writes reports as structured log events for a log-shipping issue bridge
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCrashReporter;

#[async_trait]
impl CrashReporter for TracingCrashReporter {
    async fn report(&self, report: &IssueReport) -> Result<(), ReporterError> {
        let payload =
            serde_json::to_string(report).map_err(|e| ReporterError::Delivery {
                job_id: report.job_id,
                reason: e.to_string(),
            })?;

        if report.is_error() {
            warn!(
                target: ISSUE_LOG_TARGET,
                job_id = %report.job_id,
                url = %report.url,
                error_type = report.error_type.as_deref(),
                report = %payload,
                "Scan issue reported"
            );
        } else {
            info!(
                target: ISSUE_LOG_TARGET,
                job_id = %report.job_id,
                url = %report.url,
                status = %report.status,
                report = %payload,
                "Scan completed cleanly"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        let mut job = Job::new(Uuid::new_v4(), "https://example.com", &["axe"]);
        job.finished = Some("2017-09-01T00:05:00Z".parse().unwrap());
        job
    }

    #[test]
    fn test_crash_report_carries_record() {
        let job = job();
        let record = ErrorRecord::crash("Navigation timeout").with_log("chrome: exited");

        let report = IssueReport::crash(&job, &record);

        assert!(report.is_error());
        assert_eq!(report.error_type.as_deref(), Some("crash"));
        assert_eq!(report.error_message.as_deref(), Some("Navigation timeout"));
        assert_eq!(report.log.as_deref(), Some("chrome: exited"));
        assert_eq!(Some(report.scan), job.finished);
    }

    #[test]
    fn test_clean_completion_has_no_error_type() {
        let report = IssueReport::completion(&job(), JobStatus::Finished, None);

        assert!(!report.is_error());
        assert_eq!(report.status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn test_tracing_reporter_accepts_reports() {
        let report = IssueReport::completion(&job(), JobStatus::Error, Some("hint".into()));
        assert!(TracingCrashReporter.report(&report).await.is_ok());
    }
}
