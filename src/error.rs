use std::io;
use thiserror::Error;

// Re-export anyhow's Result type
pub use anyhow::Result;

/// Custom Error type for the spigot library
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<crate::parse::ParseError> for SourceError {
    fn from(err: crate::parse::ParseError) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl From<crate::parse::DecodeError> for SourceError {
    fn from(err: crate::parse::DecodeError) -> Self {
        match err {
            crate::parse::DecodeError::Parse(e) => SourceError::Parse(e.to_string()),
            other => SourceError::Stream(other.to_string()),
        }
    }
}

impl From<crate::process::ProcessError> for SourceError {
    fn from(err: crate::process::ProcessError) -> Self {
        SourceError::Process(err.to_string())
    }
}
