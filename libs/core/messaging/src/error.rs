//! Error types for queue operations and message processing.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::subject::InvalidSubject;

/// Error categories determine retry behavior.
///
/// - **Transient**: Temporary failure, redelivered with exponential backoff
/// - **Permanent**: Unrecoverable, dead-lettered immediately
/// - **RateLimited**: Upstream service rate limited, redelivered with longer delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure (network timeout, service unavailable)
    /// Retry 3x with 1-30s exponential backoff
    Transient,

    /// Permanent failure (invalid data, rejected recipient)
    /// Dead-letter immediately, no retry
    Permanent,

    /// Rate limited by upstream service
    /// Retry 5x with 5-120s exponential backoff
    RateLimited,
}

impl ErrorCategory {
    pub fn max_retries(&self) -> u32 {
        match self {
            ErrorCategory::Transient => 3,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 5,
        }
    }

    pub fn base_backoff_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 1000,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 5000,
        }
    }

    pub fn max_backoff_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 30_000,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 120_000,
        }
    }

    /// Backoff delay before the given redelivery attempt.
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        if *self == ErrorCategory::Permanent {
            return 0;
        }

        let delay = self
            .base_backoff_ms()
            .saturating_mul(2u64.saturating_pow(retry_count));
        delay.min(self.max_backoff_ms())
    }

    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Permanent => write!(f, "permanent"),
            ErrorCategory::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Error returned by a processor for a single message.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("transient error: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("permanent error: {message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Custom error with explicit category
    #[error("{message}")]
    Custom {
        category: ErrorCategory,
        message: String,
    },
}

impl ProcessingError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn transient_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Permanent {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn rate_limited_with_retry(message: impl Into<String>, retry_after_ms: u64) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_ms: Some(retry_after_ms),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProcessingError::Transient { .. } => ErrorCategory::Transient,
            ProcessingError::Permanent { .. } => ErrorCategory::Permanent,
            ProcessingError::RateLimited { .. } => ErrorCategory::RateLimited,
            ProcessingError::Custom { category, .. } => *category,
        }
    }

    pub fn should_retry(&self, retry_count: u32) -> bool {
        self.category().should_retry(retry_count)
    }

    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        // Retry-after hint wins over the computed backoff
        if let ProcessingError::RateLimited {
            retry_after_ms: Some(ms),
            ..
        } = self
        {
            return *ms;
        }
        self.category().backoff_delay_ms(retry_count)
    }
}

/// Payload encoding/decoding error.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload parsed but failed domain validation
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Broker resource kinds named in provisioning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Stream,
    Consumer,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Stream => write!(f, "stream"),
            Resource::Consumer => write!(f, "consumer"),
        }
    }
}

/// Errors surfaced by provisioners, producers and workers.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("failed to provision {resource} '{name}': {message}")]
    Provision {
        resource: Resource,
        name: String,
        message: String,
    },

    #[error(transparent)]
    InvalidSubject(#[from] InvalidSubject),

    #[error("failed to encode payload: {0}")]
    Encode(#[source] EnvelopeError),

    #[error("failed to decode payload: {0}")]
    Decode(#[source] EnvelopeError),

    #[error("failed to publish to '{subject}': {message}")]
    Publish { subject: String, message: String },

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("acknowledgment failed: {0}")]
    Ack(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no message within {0:?}")]
    Timeout(Duration),

    #[error("subscription closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl QueueError {
    pub fn stream(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Provision {
            resource: Resource::Stream,
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn consumer(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Provision {
            resource: Resource::Consumer,
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn publish(subject: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            subject: subject.into(),
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }

    /// Retry category for startup and publish loops.
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::Connection(_)
            | QueueError::Publish { .. }
            | QueueError::Subscription(_)
            | QueueError::Ack(_)
            | QueueError::Timeout(_) => ErrorCategory::Transient,
            QueueError::Provision { message, .. } if message.contains("timed out") => {
                ErrorCategory::Transient
            }
            QueueError::Processing(e) => e.category(),
            _ => ErrorCategory::Permanent,
        }
    }
}
