//! Error types for podium_reveal

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised inside a readiness probe
///
/// The readiness gate never surfaces these; it logs them and treats the
/// resource as ready.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// No resource was named
    #[error("empty resource url")]
    EmptyUrl,

    /// Font data could not be parsed
    #[error("Font parsing failed: {0}")]
    Font(String),

    /// The probe's worker task did not finish
    #[error("Probe task failed: {0}")]
    Task(String),

    /// Reading the resource failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading podium data or configuration
#[derive(Error, Debug)]
pub enum PodiumError {
    /// A file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ranking data is not valid JSON of the expected shape
    #[error("Invalid ranking data: {0}")]
    Ranking(#[from] serde_json::Error),

    /// Configuration is not valid TOML of the expected shape
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for podium_reveal operations
pub type Result<T> = std::result::Result<T, PodiumError>;
