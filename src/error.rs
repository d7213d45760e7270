//! Error types for Mosmon
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Mosmon operations
///
/// This enum encompasses all possible errors that can occur while talking
/// to MoSAPI, caching sessions, persisting threat matches, and loading
/// configuration. The MoSAPI-facing kinds mirror the upstream status-code
/// taxonomy; the remaining variants cover local concerns.
#[derive(Error, Debug)]
pub enum MosmonError {
    /// Network or TLS failure below the HTTP layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Login received a 401 (bad username/password)
    #[error("Invalid MoSAPI credentials for entity {0}")]
    InvalidCredentials(String),

    /// Login or logout received a 403 (source address not allow-listed)
    #[error("IP address not allowed by MoSAPI for entity {0}")]
    IpNotAllowed(String),

    /// Login received a 429 (concurrent-session cap or request throttle)
    #[error("Rate limited by MoSAPI: {0}")]
    RateLimited(String),

    /// Non-login request received a 401 even after the one-shot re-login
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource genuinely absent (e.g. no METRICA report for a date)
    #[error("Not found: {0}")]
    NotFound(String),

    /// MoSAPI returned 400 with a parseable error envelope
    #[error("Bad request (resultCode {result_code}): {message}")]
    BadRequest {
        /// The `resultCode` field of the MoSAPI error envelope
        result_code: String,
        /// Human-readable message, prefixed with the local interpretation
        message: String,
    },

    /// Response body did not match the expected schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// Catch-all for unexpected MoSAPI status codes or malformed responses
    #[error("MoSAPI error: {0}")]
    Api(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secret store errors (missing or unreadable secrets)
    #[error("Secret error: {0}")]
    Secret(String),

    /// Threat-match storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for Mosmon operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`MosmonError`] at the root of an `anyhow` chain, if any.
///
/// Status-code decisions (re-login mapping, 404 sentinels, 503 translation)
/// branch on the concrete kind rather than on message text.
pub fn as_mosmon_error(err: &anyhow::Error) -> Option<&MosmonError> {
    err.downcast_ref::<MosmonError>()
}
