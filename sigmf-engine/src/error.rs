//! Errors raised by the recording and playback engines

use std::path::PathBuf;
use thiserror::Error;

pub use sigmf_core::ErrorCategory;
use sigmf_core::MetaError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Invalid capture index {0}")]
    InvalidCaptureIndex(usize),

    #[error("Recording contains metadata only, no samples to play")]
    MetadataOnly,

    #[error("Command queue is full")]
    ChannelFull,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid crop extent: {0}")]
    InvalidExtent(String),

    #[error("Sample buffer of {len} bytes is not a whole number of {sample_size} byte samples")]
    PartialSample { len: usize, sample_size: usize },
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Meta(e) => e.category(),
            EngineError::Io(_) | EngineError::MissingFile(_) => ErrorCategory::Io,
            EngineError::MetadataOnly => ErrorCategory::MalformedSidecar,
            EngineError::InvalidExtent(_) => ErrorCategory::Configuration,
            EngineError::InvalidCaptureIndex(_)
            | EngineError::InvalidCommand(_)
            | EngineError::PartialSample { .. } => ErrorCategory::Type,
            EngineError::ChannelFull => ErrorCategory::Io,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Meta(MetaError::MalformedSidecar(e.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
