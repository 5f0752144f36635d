//! Error types for workflow authoring and execution

use thiserror::Error;

/// Errors raised while building or running a workflow document.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An argument has an unsupported shape or value. Raised before the
    /// document is touched or any process is launched.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The document cannot accept the operation in its current state
    /// (already finalized, or not a workflow document at all).
    #[error("document state error: {0}")]
    State(String),

    /// The external build tool could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        WorkflowError::Config(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        WorkflowError::State(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
