//! Error types for noteblocks

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoteblocksError {
    #[error("Configuration error on line {line}: {reason}")]
    Configuration { line: usize, reason: String },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Block index {index} out of range (chain has {len} blocks)")]
    InvalidIndex { index: usize, len: usize },
    #[error("Tempo must be between 1 and 250 BPM, got {0}")]
    InvalidTempo(u32),
    #[error("Invalid scale: {0}")]
    InvalidScale(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NoteblocksError {
    pub(crate) fn config(line: usize, reason: impl Into<String>) -> Self {
        Self::Configuration { line, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, NoteblocksError>;
