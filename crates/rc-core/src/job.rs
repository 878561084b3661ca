use serde::{Deserialize, Serialize};

/// Remote state of one generation job, as last reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One unit of work submitted to the backend.
///
/// The `job_id` is generated client-side before submission and is the join
/// key between the enqueue call and all status polls that follow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub job_id: String,
    pub pipeline_name: String,
    pub input: serde_json::Map<String, serde_json::Value>,
}

/// Result of enqueueing a list of [`JobSpec`]s. Immutable once created.
///
/// `accepted_count` may be less than the number of submitted jobs when the
/// backend deduplicates or rejects some; the client treats a mismatch as
/// informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSubmission {
    pub trace_id: String,
    pub job_ids: Vec<String>,
    pub accepted_count: usize,
}

/// Last known status of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// Canonical URL of the generated asset, present once `Completed`.
    pub result_locator: Option<String>,
    /// Backend failure detail, present once `Failed`.
    pub error_detail: Option<String>,
}

impl JobStatus {
    /// Initial entry for a freshly submitted job.
    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Pending,
            result_locator: None,
            error_detail: None,
        }
    }
}

/// A recast template as served by the templates endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateRead {
    pub id: i64,
    pub name: Option<String>,
    pub url: String,
}
