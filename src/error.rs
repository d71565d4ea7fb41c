//! Error taxonomy for the analysis pipeline
//!
//! Internals return `anyhow::Result` and attach context; these variants mark
//! the failure classes the pipeline can hit so callers (and tests) can tell
//! them apart with `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// File missing, unreadable or unwritable
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unsupported or corrupt audio container
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// Zero-length buffer after decoding
    #[error("Audio buffer is empty")]
    EmptyBuffer,

    /// Failure inside a descriptor computation
    #[error("Signal analysis failed: {0}")]
    Computation(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
