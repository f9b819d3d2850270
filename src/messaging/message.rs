//! # Result Message Structures
//!
//! Message formats published by scan workers on the results queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ErrorRecord;
use crate::state_machine::HintStatus;

/// One worker report about a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    /// Job the report belongs to
    pub job_id: Uuid,
    #[serde(flatten)]
    pub payload: ResultPayload,
}

/// Report body, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultPayload {
    /// A worker started processing its share of the job
    Started { started: DateTime<Utc> },
    /// A worker resolved some hints
    Finished {
        finished: DateTime<Utc>,
        hints: Vec<HintResult>,
    },
    /// A worker crashed
    Error {
        finished: DateTime<Utc>,
        error: ErrorRecord,
    },
}

/// Outcome of one hint as reported by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResult {
    pub name: String,
    pub status: HintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl HintResult {
    pub fn new(name: impl Into<String>, status: HintStatus) -> Self {
        Self {
            name: name.into(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl ResultMessage {
    pub fn started(job_id: Uuid, started: DateTime<Utc>) -> Self {
        Self {
            job_id,
            payload: ResultPayload::Started { started },
        }
    }

    pub fn finished(job_id: Uuid, finished: DateTime<Utc>, hints: Vec<HintResult>) -> Self {
        Self {
            job_id,
            payload: ResultPayload::Finished { finished, hints },
        }
    }

    pub fn crashed(job_id: Uuid, finished: DateTime<Utc>, error: ErrorRecord) -> Self {
        Self {
            job_id,
            payload: ResultPayload::Error { finished, error },
        }
    }

    /// Short name of the report kind for logging
    pub fn kind(&self) -> &'static str {
        match self.payload {
            ResultPayload::Started { .. } => "started",
            ResultPayload::Finished { .. } => "finished",
            ResultPayload::Error { .. } => "error",
        }
    }

    /// Create from JSON read off the queue
    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }

    /// Convert to JSON for queue storage
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// A decoded result message together with its queue bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedResult {
    /// Queue message id, used to acknowledge the message
    pub msg_id: i64,
    /// How many times the queue handed this message out
    pub read_count: i32,
    pub message: ResultMessage,
}

impl QueuedResult {
    pub fn new(msg_id: i64, message: ResultMessage) -> Self {
        Self {
            msg_id,
            read_count: 1,
            message,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.message.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_started_message_from_wire_format() {
        let message = ResultMessage::from_json(json!({
            "jobId": "0b1d4c6e-2f39-4b8a-9c57-3e6d8f1a2b4c",
            "kind": "started",
            "started": "2017-09-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(message.kind(), "started");
        assert!(matches!(message.payload, ResultPayload::Started { .. }));
    }

    #[test]
    fn test_finished_message_from_wire_format() {
        let message = ResultMessage::from_json(json!({
            "jobId": "0b1d4c6e-2f39-4b8a-9c57-3e6d8f1a2b4c",
            "kind": "finished",
            "finished": "2017-09-01T00:05:00Z",
            "hints": [
                {"name": "axe", "status": "error", "detail": {"messages": 3}},
                {"name": "content-type", "status": "finished"}
            ]
        }))
        .unwrap();

        let ResultPayload::Finished { hints, .. } = message.payload else {
            panic!("Expected finished payload");
        };
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].status, HintStatus::Error);
        assert_eq!(hints[0].detail, Some(json!({"messages": 3})));
        assert!(hints[1].detail.is_none());
    }

    #[test]
    fn test_error_message_carries_crash_record() {
        let message = ResultMessage::from_json(json!({
            "jobId": "0b1d4c6e-2f39-4b8a-9c57-3e6d8f1a2b4c",
            "kind": "error",
            "finished": "2017-09-01T00:05:00Z",
            "error": {"errorType": "crash", "message": "Navigation timeout", "log": "..."}
        }))
        .unwrap();

        let ResultPayload::Error { error, .. } = message.payload else {
            panic!("Expected error payload");
        };
        assert_eq!(error.error_type, "crash");
        assert_eq!(error.log.as_deref(), Some("..."));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = ResultMessage::from_json(json!({
            "jobId": "0b1d4c6e-2f39-4b8a-9c57-3e6d8f1a2b4c",
            "kind": "cancelled"
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_wire_format_uses_kind_tag() {
        let job_id = Uuid::new_v4();
        let message = ResultMessage::started(job_id, Utc::now());
        let json = message.to_json().unwrap();

        assert_eq!(json["kind"], "started");
        assert_eq!(json["jobId"], job_id.to_string());
    }
}
