use thiserror::Error;
use uuid::Uuid;

/// Application-wide error types for Argus.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Queue publish/claim/ack failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Browser-level failure. The message carries the raw engine error
    /// (including Chromium `net::ERR_*` tags) so the classifier can read it.
    #[error("{0}")]
    Browser(String),

    /// Page navigation exceeded the configured timeout.
    #[error("Navigation timed out after {0} ms")]
    NavigationTimeout(u64),

    /// Navigation completed without producing a response object.
    #[error("No response received")]
    NoResponse,

    /// A URL that could not be processed at all.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request payload failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record lookup by id came up empty where one was required.
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// Bad or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}
