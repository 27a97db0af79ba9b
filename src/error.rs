//! Error types for jobwatch
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] enum and [`Result`] alias
//! - Tagged decoding of the job service's `{"detail": ...}` failure bodies
//! - Transient vs permanent classification ([`IsRetryable`])

use crate::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for jobwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jobwatch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// Transport-level failure (connect, timeout, body decode)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status without a decodable failure body
    #[error("HTTP {status}: {reason}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase (or a short description)
        reason: String,
    },

    /// The job service rejected the request and explained why
    #[error("request rejected with status {status}: {detail}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Decoded `detail` payload
        detail: ErrorDetail,
    },

    /// URL could not be parsed or resolved
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job has no retrievable artifact yet
    #[error("job {id} has no downloadable file (status: {status})")]
    NotReady {
        /// The job that was asked for
        id: JobId,
        /// Its status at the time of the request
        status: JobStatus,
    },

    /// Shutdown in progress - the feed or dispatcher no longer accepts commands
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status attached to this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } | Error::Api { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Quota state returned by the job service when a creation request is rate limited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDetail {
    /// Reason reported by the server
    pub error: String,
    /// Jobs created in the last hour
    pub hourly_count: u64,
    /// Jobs allowed per hour
    pub hourly_limit: u64,
    /// Jobs created in the last day
    pub daily_count: u64,
    /// Jobs allowed per day
    pub daily_limit: u64,
}

/// The `detail` member of a failure body
///
/// Variants are tried in order; anything that is neither a plain message nor a
/// complete rate-limit object lands in [`ErrorDetail::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// Plain string detail
    Message(String),
    /// Structured rate-limit rejection
    RateLimited(RateLimitDetail),
    /// Any other shape
    Unrecognized(serde_json::Value),
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetail::Message(msg) => f.write_str(msg),
            ErrorDetail::RateLimited(limit) => write!(f, "{} (rate limited)", limit.error),
            ErrorDetail::Unrecognized(value) => write!(f, "{}", value),
        }
    }
}

/// Failure body envelope: `{"detail": ...}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) detail: ErrorDetail,
}

/// Trait for errors that can be classified as transient or permanent
///
/// Transient failures (timeouts, refused connections, 5xx) are expected to clear
/// up on their own and are simply tried again on the next poll tick.
pub trait IsRetryable {
    /// Returns true if the error is transient
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Http { status, .. } | Error::Api { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. }
            | Error::InvalidUrl(_)
            | Error::Serialization(_)
            | Error::NotReady { .. }
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}
