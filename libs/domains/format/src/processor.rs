use async_trait::async_trait;
use messaging::{ProcessingError, Processor, Raw};
use tracing::info;

/// Logs each message body and acks it.
#[derive(Debug, Clone, Default)]
pub struct LogProcessor;

#[async_trait]
impl Processor<Raw> for LogProcessor {
    async fn process(&self, message: &Raw) -> Result<(), ProcessingError> {
        info!(message = %message.to_text(), "Received message");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "format_log"
    }
}
