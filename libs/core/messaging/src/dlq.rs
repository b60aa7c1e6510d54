//! Dead letter queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::{Broker, Delivery, PublishReceipt, StreamHandle, StreamInfo};
use crate::config::{PublishMode, Retention, StreamSpec};
use crate::envelope;
use crate::error::QueueError;

/// Entry stored in the dead letter stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub stream: String,
    pub consumer: String,
    /// Subject the message was originally published to
    pub subject: String,
    /// Original payload, lossy UTF-8
    pub payload: String,
    pub error: String,
    /// `transient`, `permanent`, `rate_limited` or `decode`
    pub category: String,
    pub delivered: u64,
    pub sequence: u64,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_delivery<D: Delivery>(
        delivery: &D,
        stream: &str,
        consumer: &str,
        category: &str,
        error: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            subject: delivery.subject().to_string(),
            payload: String::from_utf8_lossy(delivery.payload()).into_owned(),
            error: error.to_string(),
            category: category.to_string(),
            delivered: delivery.delivered(),
            sequence: delivery.sequence(),
            failed_at: Utc::now(),
        }
    }
}

/// Publishes dead letters for one source stream.
#[derive(Clone)]
pub struct DeadLetterQueue<B> {
    broker: B,
    stream: String,
    subject_prefix: String,
}

impl<B: Broker> DeadLetterQueue<B> {
    /// `dlq_stream` receives entries under `dlq.<SOURCE_STREAM>.>`; the
    /// stream name keeps its case and must differ from every domain token.
    pub fn new(broker: B, dlq_stream: &str, source_stream: &str) -> Self {
        Self {
            broker,
            stream: dlq_stream.to_string(),
            subject_prefix: format!("dlq.{}", source_stream),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    pub fn spec(&self) -> StreamSpec {
        StreamSpec::new(&self.stream, vec![format!("{}.>", self.subject_prefix)])
            .with_retention(Retention::Limits)
    }

    pub fn subject_for(&self, consumer: &str) -> String {
        format!("{}.{}", self.subject_prefix, consumer)
    }

    pub async fn ensure(&self) -> Result<StreamHandle, QueueError> {
        let handle = self.broker.ensure_stream(&self.spec()).await?;
        info!(stream = %self.stream, "DLQ stream ready");
        Ok(handle)
    }

    pub async fn send(&self, entry: &DeadLetter) -> Result<PublishReceipt, QueueError> {
        let subject = self.subject_for(&entry.consumer);
        let payload = envelope::to_json(entry).map_err(QueueError::Encode)?;
        let receipt = self
            .broker
            .publish(&subject, payload, PublishMode::Acknowledged)
            .await?;

        debug!(
            id = %entry.id,
            source_sequence = entry.sequence,
            sequence = ?receipt.sequence,
            "Moved message to DLQ"
        );
        Ok(receipt)
    }

    pub async fn stats(&self) -> Result<StreamInfo, QueueError> {
        self.broker.stream_info(&self.stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Subscription;
    use crate::config::ConsumerSpec;
    use crate::memory::InMemoryBroker;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ensure_and_send() {
        let broker = InMemoryBroker::new();
        let source = broker
            .ensure_stream(&StreamSpec::new("SMTP", vec!["*.smtp.>".into()]))
            .await
            .unwrap();
        let dlq = DeadLetterQueue::new(broker.clone(), "SMTP_DLQ", "SMTP");
        dlq.ensure().await.unwrap();
        assert_eq!(dlq.subject_for("smtp"), "dlq.SMTP.smtp");

        broker
            .publish(
                "debug.smtp.subscribe",
                b"{\"subject\":1}".to_vec(),
                PublishMode::Buffered,
            )
            .await
            .unwrap();
        let mut sub = broker
            .ensure_consumer(&source, &ConsumerSpec::new("smtp", "debug.smtp.subscribe"))
            .await
            .unwrap();
        let delivery = tokio::time::timeout(Duration::from_millis(100), sub.next())
            .await
            .unwrap()
            .unwrap();

        let entry = DeadLetter::from_delivery(&delivery, "SMTP", "smtp", "decode", "bad json");
        assert_eq!(entry.payload, "{\"subject\":1}");
        assert_eq!(entry.delivered, 1);

        let receipt = dlq.send(&entry).await.unwrap();
        assert_eq!(receipt.subject, "dlq.SMTP.smtp");
        assert_eq!(receipt.stream.as_deref(), Some("SMTP_DLQ"));

        let stored = broker.retained_payloads("SMTP_DLQ").await;
        let decoded: DeadLetter = serde_json::from_slice(&stored[0]).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(dlq.stats().await.unwrap().messages, 1);
    }
}
