//! Email senders

pub mod log;
pub mod smtp;

pub use log::LogSender;
pub use smtp::{SmtpConfig, SmtpSender};

use async_trait::async_trait;
use lettre::message::Mailbox;

use crate::error::SmtpError;

/// Delivers an HTML message to a list of recipients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, subject: &str, html: &str, to: &[Mailbox]) -> Result<(), SmtpError>;

    async fn health_check(&self) -> Result<bool, SmtpError> {
        Ok(true)
    }

    /// Used in logs.
    fn name(&self) -> &'static str;
}
