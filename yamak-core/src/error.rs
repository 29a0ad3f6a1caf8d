//! Error types for yamak-core
//!
//! Only setup paths (config loading, HTTP client construction, pattern
//! compilation) return these. Tracking itself never fails outward: a problem
//! while tracking means the event is not sent, and at most a log line.

use thiserror::Error;

/// Main error type for the yamak-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Exclusion pattern could not be compiled
    #[error("invalid path pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for yamak-core
pub type Result<T> = std::result::Result<T, Error>;
