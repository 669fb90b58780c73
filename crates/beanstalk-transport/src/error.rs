//! Error types for queue and transport operations.

use crate::job::JobId;
use chrono::Duration;
use thiserror::Error;

/// Errors raised by a queue client while talking to the queue service
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Job {job_id} not found or not reserved by this connection")]
    JobNotFound { job_id: JobId },

    #[error("Job body of {size} bytes exceeds the server's max-job-size")]
    JobTooBig { size: usize },

    #[error("Server is draining and refuses new jobs")]
    Draining,

    #[error("Server expected CRLF after job body")]
    ExpectedCrlf,

    #[error("Server ran out of memory and buried job {job_id} on insert")]
    BuriedOnInsert { job_id: JobId },

    #[error("Tube '{tube}' cannot be ignored: it is the only watched tube")]
    NotIgnored { tube: String },

    #[error("Server error: {code}")]
    ServerError { code: String },

    #[error("Unexpected response to '{command}': {response}")]
    UnexpectedResponse { command: String, response: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    /// Check if error is transient and may succeed when retried by the caller
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::Timeout { .. } => true,
            Self::JobNotFound { .. } => false,
            Self::JobTooBig { .. } => false,
            Self::Draining => true,
            Self::ExpectedCrlf => false,
            Self::BuriedOnInsert { .. } => true,
            Self::NotIgnored { .. } => false,
            Self::ServerError { code } => code == "OUT_OF_MEMORY" || code == "INTERNAL_ERROR",
            Self::UnexpectedResponse { .. } => false,
            Self::Io(_) => true,
        }
    }
}

/// Errors raised by an envelope codec
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encoded envelope is missing field '{field}'")]
    MissingField { field: String },

    #[error("Encoded envelope field '{field}' is invalid: {message}")]
    InvalidField { field: String, message: String },

    #[error("Message (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a reserved job could not be turned into an envelope
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Job body is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("Codec rejected job body: {0}")]
    Codec(#[from] CodecError),
}

/// Errors surfaced by the envelope transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No TransportMessageIdStamp found on the envelope")]
    MissingStamp,

    #[error("Envelope encoding failed: {0}")]
    Encode(#[source] CodecError),

    #[error("Envelope decoding failed: {0}")]
    Decode(#[source] CodecError),

    #[error("Encoded envelope could not be serialized: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl TransportError {
    /// Check if error is transient; only queue failures can be
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Queue(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<ValidationError> for ConfigurationError {
    fn from(err: ValidationError) -> Self {
        Self::Invalid {
            message: err.to_string(),
        }
    }
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
