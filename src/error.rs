//! ReelGuard error types

use std::path::PathBuf;
use thiserror::Error;

/// ReelGuard error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pressure monitor error
    #[error("Monitor error: {0}")]
    Monitor(String),

    /// Generation request error
    #[error("Generation error: {0}")]
    Generation(String),

    /// Malformed generation request (programmer error)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The output directory could not be created
    #[error("Cannot create output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Even the placeholder tier could not be written
    #[error("Cannot write placeholder output {}: {source}", path.display())]
    PlaceholderWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error belongs to the fatal class surfaced to callers of
    /// a generation request (no further fallback exists).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OutputDirectory { .. } | Self::PlaceholderWrite { .. }
        )
    }
}

/// Result type alias for ReelGuard operations
pub type Result<T> = std::result::Result<T, Error>;
