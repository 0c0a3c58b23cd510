use project::ProjectError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timeline::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobError {
    #[error("timeline host unavailable: {0}")]
    BridgeUnavailable(String),
    #[error("host refused the request: {0}")]
    HostRejected(String),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("generation rate limited: {0}")]
    GenerationRateLimited(String),
    #[error("generation server error {status}: {body}")]
    GenerationServerError { status: u16, body: String },
    #[error("generation rejected ({status}): {body}")]
    GenerationRejected { status: u16, body: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("placed with conflict risk: {0}")]
    PlacementConflict(String),
    #[error("placement failed: {0}")]
    PlacementFailed(String),
    #[error("could not save audio: {0}")]
    PersistenceFailure(String),
    #[error("project is unsaved and no fallback folder is configured")]
    ProjectUnsaved,
}

impl JobError {
    /// Rate limiting, server errors and transport failures are worth another
    /// attempt; everything else fails the job immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::GenerationRateLimited(_) | JobError::GenerationServerError { .. } | JobError::Transport(_))
    }
}

impl From<BridgeError> for JobError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Unavailable(msg) => JobError::BridgeUnavailable(msg),
            BridgeError::Rejected(msg) | BridgeError::Malformed(msg) => JobError::HostRejected(msg),
        }
    }
}

impl From<ProjectError> for JobError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::ProjectUnsaved => JobError::ProjectUnsaved,
            other => JobError::PersistenceFailure(other.to_string()),
        }
    }
}
