use std::io;
use thiserror::Error;

/// Result type for process operations
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Errors that can occur during process operations
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("no command specified")]
    EmptyCommand,

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to read from process: {0}")]
    Read(#[source] io::Error),

    #[error("failed to signal process: {0}")]
    Signal(String),

    #[error("unknown signal name: {0:?}")]
    UnknownSignal(String),

    #[error("process not started")]
    NotStarted,

    #[error("other process error: {0}")]
    Other(String),
}
