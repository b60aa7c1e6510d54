//! Processor trait for message handling.

use async_trait::async_trait;

use crate::error::ProcessingError;

/// Message processor.
///
/// Return a `ProcessingError` with the appropriate category:
/// - `Transient`: redelivered with exponential backoff
/// - `Permanent`: dead-lettered
/// - `RateLimited`: redelivered with longer delays
///
/// ```rust,ignore
/// #[async_trait]
/// impl Processor<Email> for EmailProcessor {
///     async fn process(&self, email: &Email) -> Result<(), ProcessingError> {
///         self.sender.send(email).await.map_err(classify)
///     }
///
///     fn name(&self) -> &'static str {
///         "email_processor"
///     }
/// }
/// ```
#[async_trait]
pub trait Processor<T: Send + Sync>: Send + Sync {
    async fn process(&self, payload: &T) -> Result<(), ProcessingError>;

    /// Used for logging and metrics labels.
    fn name(&self) -> &'static str;

    /// Readiness of downstream dependencies.
    async fn health_check(&self) -> Result<bool, ProcessingError> {
        Ok(true)
    }
}

/// A processor that accepts everything (for testing).
#[derive(Debug, Clone, Default)]
pub struct NoOpProcessor;

#[async_trait]
impl<T: Send + Sync> Processor<T> for NoOpProcessor {
    async fn process(&self, _payload: &T) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop_processor"
    }
}

/// A processor that always fails (for testing).
#[derive(Debug, Clone)]
pub struct FailingProcessor {
    error_message: String,
    transient: bool,
}

impl FailingProcessor {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            transient: false,
        }
    }
}

#[async_trait]
impl<T: Send + Sync> Processor<T> for FailingProcessor {
    async fn process(&self, _payload: &T) -> Result<(), ProcessingError> {
        if self.transient {
            Err(ProcessingError::transient(&self.error_message))
        } else {
            Err(ProcessingError::permanent(&self.error_message))
        }
    }

    fn name(&self) -> &'static str {
        "failing_processor"
    }
}
