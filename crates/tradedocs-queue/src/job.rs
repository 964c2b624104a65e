use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle as reported to pollers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// Completed and Failed jobs never change again.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Snapshot of a job, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    /// 0 while queued/running, 100 on completion.
    pub progress: u8,
    /// Attempts started so far (1-based once the job runs).
    pub attempts_made: u32,
    /// Handler result, present once completed.
    pub result: Option<Value>,
    /// Last failure reason, present once failed.
    pub error: Option<String>,
}

/// Internal queue record for one job.
#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub payload: Value,
    pub status: JobStatus,
}

impl JobRecord {
    pub fn new(id: JobId, payload: Value) -> Self {
        Self {
            payload,
            status: JobStatus {
                id,
                state: JobState::Waiting,
                progress: 0,
                attempts_made: 0,
                result: None,
                error: None,
            },
        }
    }
}
