//! Error types for leetcrew.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    /// Caller error: the problem statement is missing or blank.
    #[error("{0}")]
    InvalidInput(String),

    /// A bound worker failed while executing a stage. The run is aborted.
    #[error("Stage {stage} ({role}) failed: {reason}")]
    StageExecution {
        stage: usize,
        role: String,
        reason: String,
    },

    /// Startup-time configuration integrity violation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SolverError {
    /// Whether the error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SolverError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
