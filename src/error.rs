//! Error types for the mention agent.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Character '{name}' could not be loaded: {reason}")]
    Character { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the social platform client.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Rate limited by platform, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Platform request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Platform request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Whether the next poll cycle is expected to succeed without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::RateLimited { .. } | PlatformError::Timeout(_) => true,
            PlatformError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            PlatformError::Http(_) => true,
            PlatformError::InvalidResponse(_) => false,
        }
    }
}

/// Text or image generation failures. Always recoverable by degrading the reply.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Image prompt is empty")]
    EmptyPrompt,

    #[error("Provider {0} returned no output")]
    EmptyResult(String),

    #[error("Invalid image data: {0}")]
    InvalidImageData(String),
}

/// Object storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload of {filename} failed: {reason}")]
    UploadFailed { filename: String, reason: String },

    #[error("Storage client setup failed: {0}")]
    Client(String),
}

/// Request queue failures. A task's own error travels inside its output, not here.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Request queue worker has stopped")]
    Closed,

    #[error("Queued task panicked")]
    TaskPanicked,
}

/// Per-item pipeline failures, caught at the orchestrator's item boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
