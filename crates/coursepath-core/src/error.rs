use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("core courses not found in catalog: {}", .0.join(", "))]
    UnknownCoreCourses(Vec<String>),

    #[error("candidate pool is empty; cannot select electives")]
    EmptyCandidatePool,

    #[error("malformed catalog record: {0}")]
    MalformedRecord(String),

    #[error("malformed response from {stage}: {reason}")]
    MalformedResponse { stage: String, reason: String },

    #[error("text generation error: {0}")]
    Generation(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("no stored session: {0}")]
    SessionNotFound(String),

    #[error("plan {requested} not found ({available} plans available)")]
    PlanNotFound { requested: usize, available: usize },

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error("prompt error: {0}")]
    Prompt(#[from] coursepath_pm::PmError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
