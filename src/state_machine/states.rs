use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status as seen by the scan service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job submitted, no worker has reported yet
    #[default]
    Pending,
    /// At least one worker reported starting
    Started,
    /// Every hint resolved and nothing failed
    Finished,
    /// Every hint resolved and a hint failed or a worker crashed
    Error,
}

impl JobStatus {
    /// Check if this is a terminal state (all hints resolved)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// Check if this is an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

/// Hint status within a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintStatus {
    /// No worker has reported on this hint
    #[default]
    Pending,
    /// A worker picked the hint up
    Processing,
    /// Hint ran to completion
    Finished,
    /// Hint ran and reported an error
    Error,
}

impl HintStatus {
    /// Check if a worker has reported on this hint at all
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if this is an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for HintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for HintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "finished" => Ok(Self::Finished),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid hint status: {s}")),
        }
    }
}
