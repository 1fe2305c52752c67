//! Action, result and job wire shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handler parameters
pub type Params = Map<String, Value>;

/// Caller metadata (identity, origin)
pub type Meta = Option<Map<String, Value>>;

fn new_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A request to run one registered operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "new_action_id")]
    pub id: String,
    /// Registry key of the handler
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Params,
    /// Advisory only: the dispatcher runs confirmed and unconfirmed actions alike
    #[serde(default)]
    pub confirm: bool,
    /// Run as a tracked background job
    #[serde(default, rename = "async")]
    pub run_async: bool,
    #[serde(default)]
    pub meta: Meta,
}

impl Action {
    /// A synchronous action with a fresh id
    #[must_use]
    pub fn new(kind: impl Into<String>, params: Params) -> Self {
        Self {
            id: new_action_id(),
            kind: kind.into(),
            params,
            confirm: false,
            run_async: false,
            meta: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub const fn in_background(mut self) -> Self {
        self.run_async = true;
        self
    }
}

/// Outcome of a synchronous execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Completed,
    Error,
}

/// Response to a synchronous action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub action_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    #[must_use]
    pub fn completed(action_id: impl Into<String>, result: Value) -> Self {
        Self {
            status: ResultStatus::Completed,
            result: Some(result),
            error: None,
            action_id: action_id.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(action_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            result: None,
            error: Some(error.into()),
            action_id: action_id.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ResultStatus::Completed
    }
}

/// Response to an accepted background action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsyncAccepted {
    pub status: &'static str,
    pub job_id: String,
    pub action_id: String,
}

impl AsyncAccepted {
    #[must_use]
    pub const fn new(job_id: String, action_id: String) -> Self {
        Self {
            status: "accepted",
            job_id,
            action_id,
        }
    }
}

/// Lifecycle of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    /// Whether moving to `next` keeps the lifecycle monotonic
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Tracked record of a background action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub action_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub retries: u32,
}
