//! Worker-side handler that delivers queued emails.

use async_trait::async_trait;
use messaging::{ProcessingError, Processor};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SmtpError;
use crate::models::Email;
use crate::provider::Sender;

/// Delivers each [`Email`] through a [`Sender`].
pub struct EmailProcessor<S: Sender> {
    sender: Arc<S>,
}

impl<S: Sender> EmailProcessor<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }
}

impl<S: Sender> Clone for EmailProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

/// Map a send failure onto the worker's retry categories.
pub fn classify(error: SmtpError) -> ProcessingError {
    match error {
        SmtpError::Transport(e) if e.is_permanent() => {
            ProcessingError::permanent_with_source("SMTP server rejected the email", e)
        }
        SmtpError::Transport(e) => {
            let message = e.to_string();
            let lower = message.to_lowercase();
            if lower.contains("rate") || lower.contains("too many") {
                ProcessingError::rate_limited(message)
            } else {
                ProcessingError::transient_with_source(message, e)
            }
        }
        other => ProcessingError::permanent_with_source(other.to_string(), other),
    }
}

#[async_trait]
impl<S: Sender + 'static> Processor<Email> for EmailProcessor<S> {
    async fn process(&self, email: &Email) -> Result<(), ProcessingError> {
        let to = email.mailboxes();
        debug!(
            subject = %email.subject,
            recipients = to.len(),
            sender = self.sender.name(),
            "Sending email"
        );

        self.sender
            .send(&email.subject, &email.message, &to)
            .await
            .map_err(classify)
    }

    fn name(&self) -> &'static str {
        "email_processor"
    }

    async fn health_check(&self) -> Result<bool, ProcessingError> {
        match self.sender.health_check().await {
            Ok(healthy) => Ok(healthy),
            Err(e) => {
                warn!(error = %e, sender = self.sender.name(), "Sender health check failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recipient;
    use crate::provider::MockSender;
    use messaging::ErrorCategory;

    fn email() -> Email {
        Email::new(
            "Test",
            "Hello World",
            vec![
                Recipient::new("kristopherab@gmail.com".parse().unwrap(), "Kristopher"),
                Recipient::new("a@example.com".parse().unwrap(), "Ada").with_last_name("Lovelace"),
            ],
        )
    }

    #[tokio::test]
    async fn test_sends_subject_body_and_all_recipients() {
        let mut sender = MockSender::new();
        sender.expect_name().return_const("mock");
        sender
            .expect_send()
            .withf(|subject, html, to| {
                subject == "Test"
                    && html == "Hello World"
                    && to.len() == 2
                    && to[1].name.as_deref() == Some("Ada Lovelace")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let processor = EmailProcessor::new(sender);
        assert!(processor.process(&email()).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_message_is_permanent() {
        let mut sender = MockSender::new();
        sender.expect_name().return_const("mock");
        sender
            .expect_send()
            .returning(|_, _, _| Err(SmtpError::NoRecipients));

        let processor = EmailProcessor::new(sender);
        let err = processor.process(&email()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(!err.should_retry(0));
    }

    #[test]
    fn test_classify_address_error() {
        let bad = "nope".parse::<lettre::Address>().unwrap_err();
        let err = classify(SmtpError::Address(bad));
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[tokio::test]
    async fn test_unhealthy_sender_reports_not_ready() {
        let mut sender = MockSender::new();
        sender.expect_name().return_const("mock");
        sender
            .expect_health_check()
            .returning(|| Err(SmtpError::MissingPassword));

        let processor = EmailProcessor::new(sender);
        assert!(!processor.health_check().await.unwrap());
        assert_eq!(processor.name(), "email_processor");
    }
}
