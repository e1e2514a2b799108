use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Status of an asynchronous text detection job as reported by the backend.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    PartialSuccess,
}

impl JobStatus {
    /// Whether the job has left `IN_PROGRESS`.
    pub fn is_terminal(self) -> bool {
        self != JobStatus::InProgress
    }
}

/// Bucket and key of the document a job reads from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentLocation {
    pub bucket: String,
    pub key: String,
}

impl DocumentLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// A submitted text detection job.
///
/// The handle is opaque and never reused by the backend; it is dropped once
/// results have been fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextDetectionJob {
    pub job_id: String,
    pub source: DocumentLocation,
}
