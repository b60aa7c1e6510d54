//! Sender that only logs, for local development without SMTP credentials.

use async_trait::async_trait;
use lettre::message::Mailbox;
use tracing::info;

use super::Sender;
use crate::error::SmtpError;

#[derive(Debug, Clone, Default)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn send(&self, subject: &str, html: &str, to: &[Mailbox]) -> Result<(), SmtpError> {
        if to.is_empty() {
            return Err(SmtpError::NoRecipients);
        }

        let to: Vec<String> = to.iter().map(ToString::to_string).collect();
        info!(
            subject = %subject,
            to = ?to,
            bytes = html.len(),
            "Email not sent (log-only sender)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
