//! Error types for narrator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarratorError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Preflight errors
    #[error("{resource} is missing. {remedy}")]
    MissingPrerequisite { resource: String, remedy: String },

    // Worker errors
    #[error("Failed to start synthesis worker: {message}")]
    WorkerSpawn { message: String },

    #[error("Failed to send request to synthesis worker: {message}")]
    WorkerWrite { message: String },

    #[error("Synthesis worker exited before answering")]
    WorkerExited,

    #[error("Synthesis worker did not answer within {}", format_timeout(.timeout))]
    WorkerTimeout { timeout: std::time::Duration },

    #[error("Worker protocol error: {message}")]
    Protocol { message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Worker reported success but segment is missing: {path}")]
    MissingSegment { path: String },

    // Assembly errors
    #[error("Audio assembly failed: {message}")]
    Assembly { message: String },

    // Content errors
    #[error("Content source error: {message}")]
    ContentSource { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl NarratorError {
    /// Whether this error must abort the whole run rather than a single item.
    ///
    /// Nothing can be narrated without the worker, so a spawn failure is fatal
    /// even when it surfaces while processing an item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NarratorError::MissingPrerequisite { .. } | NarratorError::WorkerSpawn { .. }
        )
    }
}

fn format_timeout(timeout: &std::time::Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*timeout)
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, NarratorError>;
