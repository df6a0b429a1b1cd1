//! Error types for the heart-rate ETL pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while ingesting recordings or building the calendar
#[derive(Debug, Error)]
pub enum EtlError {
    /// Bad or missing directories and settings. Fatal for the whole run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Recording has no samples: {0}")]
    EmptyRecording(String),

    #[error("Malformed recording: {0}")]
    MalformedRecording(String),

    /// The cheap filename-derived key disagrees with the recording's own timestamp.
    #[error(
        "Cache key mismatch for {input}: filename says {filename_key}, content says {content_key}"
    )]
    CacheInconsistency {
        input: PathBuf,
        filename_key: String,
        content_key: String,
    },

    #[error("Artifact {key} already written during this run at {path}")]
    ArtifactCollision { key: String, path: PathBuf },

    #[error("External source unavailable: {0}")]
    ExternalSourceUnavailable(String),

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Date parse error: {0}")]
    DateParse(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
