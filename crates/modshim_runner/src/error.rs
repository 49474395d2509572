//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running external commands.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command timeout after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
