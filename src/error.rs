//! Error types for tweetlikes-dl
//!
//! This module provides the crate-wide error type. Errors are grouped by how
//! the caller should react to them:
//! - configuration and usage errors abort before any network activity
//! - authorization, not-found and server errors abort the run
//! - per-media failures never become an [`Error`]; they are reported as
//!   [`DownloadOutcome`](crate::types::DownloadOutcome) values instead

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tweetlikes-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tweetlikes-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "filename_template")
        key: Option<String>,
    },

    /// Credentials were rejected by the feed service (HTTP 401)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The requested account or resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The feed service failed with a 5xx status
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code returned by the service
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// Any other non-success response from the feed service
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code returned by the service
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// Rate-limit quota did not reset within the configured number of waits
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// No stored credentials were found
    #[error("no credentials found at {}; run `authorize` first", .0.display())]
    CredentialsMissing(PathBuf),

    /// The run was cancelled before completion
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether the error is a usage problem the user can fix by changing arguments
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::CredentialsMissing(_))
    }

    /// Process exit code for this error when it terminates the CLI
    ///
    /// Usage and configuration problems map to 2, everything else to 1.
    pub fn exit_code(&self) -> u8 {
        if self.is_usage() { 2 } else { 1 }
    }

    /// Short, user-facing explanation printed by the CLI
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthorized(_) => "Unauthorized, please run authorize again.".to_string(),
            Error::Server { .. } => "A server error has occurred, try again later.".to_string(),
            other => other.to_string(),
        }
    }
}
