//! Error types.
//!
//! Backend failures propagate to the caller; everything a task can report
//! about its own inputs is turned into an envelope by the coordinator.

use thiserror::Error;

/// Failures talking to the search backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure: connection refused, timeout, TLS, ...
    #[error("backend unavailable for {path}: {message}")]
    Unavailable { path: String, message: String },

    /// The backend answered with a non-2xx status.
    #[error("backend request {path} failed with status {status}: {body}")]
    RequestFailed {
        path: String,
        status: u16,
        body: String,
    },

    /// The body was not the JSON we expected.
    #[error("invalid response from {path}: {message}")]
    InvalidResponse { path: String, message: String },
}

impl BackendError {
    pub fn path(&self) -> &str {
        match self {
            BackendError::Unavailable { path, .. }
            | BackendError::RequestFailed { path, .. }
            | BackendError::InvalidResponse { path, .. } => path,
        }
    }
}

/// Outcome of a task that did not produce a result envelope.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Missing or malformed parameters.
    #[error("{0}")]
    Validation(String),

    /// A label could not be resolved to an id.
    #[error("{kind} '{label}' not found.")]
    NotFound { kind: &'static str, label: String },

    /// No registered handler declares the task.
    #[error("no agent registered for task '{task}'")]
    Unsupported { task: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }
}

/// Failures of the LLM tool-calling loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("LLM did not produce a final answer in {0} steps")]
    StepBudgetExceeded(usize),

    #[error("no LLM API key configured (set OPENAI_API_KEY or [llm].api_key)")]
    MissingApiKey,

    #[error(transparent)]
    Backend(#[from] BackendError),
}
