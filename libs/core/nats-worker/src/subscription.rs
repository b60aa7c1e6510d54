//! Queue-group subscription to a JetStream push consumer.

use async_nats::jetstream::consumer::push;
use async_nats::jetstream::{AckKind, Message};
use async_trait::async_trait;
use futures::StreamExt;
use messaging::{Delivery, QueueError, Subscription};
use std::time::Duration;
use tracing::debug;

pub struct JetStreamSubscription {
    messages: push::Messages,
    durable: String,
}

impl JetStreamSubscription {
    pub(crate) fn new(messages: push::Messages, durable: &str) -> Self {
        Self {
            messages,
            durable: durable.to_string(),
        }
    }
}

#[async_trait]
impl Subscription for JetStreamSubscription {
    type Delivery = JetStreamDelivery;

    async fn next(&mut self) -> Result<JetStreamDelivery, QueueError> {
        match self.messages.next().await {
            Some(Ok(message)) => JetStreamDelivery::new(message),
            Some(Err(e)) => Err(QueueError::Subscription(e.to_string())),
            None => Err(QueueError::Closed),
        }
    }

    async fn close(self) -> Result<(), QueueError> {
        // Dropping the message stream unsubscribes from the deliver subject.
        drop(self.messages);
        debug!(consumer = %self.durable, "Left queue group");
        Ok(())
    }
}

/// A JetStream message with its delivery metadata decoded up front.
pub struct JetStreamDelivery {
    message: Message,
    sequence: u64,
    delivered: u64,
}

impl JetStreamDelivery {
    fn new(message: Message) -> Result<Self, QueueError> {
        let (sequence, delivered) = {
            let info = message.info().map_err(|e| {
                QueueError::Subscription(format!("invalid delivery metadata: {}", e))
            })?;
            (info.stream_sequence, delivery_count(info.delivered))
        };

        Ok(Self {
            message,
            sequence,
            delivered,
        })
    }

    async fn respond(self, kind: AckKind) -> Result<(), QueueError> {
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }
}

/// Broker-reported delivery count; a negative value is corrupt metadata and
/// counts as a first delivery.
fn delivery_count(delivered: i64) -> u64 {
    u64::try_from(delivered).unwrap_or_else(|_| {
        debug!(delivered, "Negative delivery count in message metadata, treating as 1");
        1
    })
}

#[async_trait]
impl Delivery for JetStreamDelivery {
    fn subject(&self) -> &str {
        &self.message.subject
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn delivered(&self) -> u64 {
        self.delivered
    }

    async fn ack(self) -> Result<(), QueueError> {
        self.respond(AckKind::Ack).await
    }

    async fn nak(self, delay: Option<Duration>) -> Result<(), QueueError> {
        self.respond(AckKind::Nak(delay)).await
    }

    async fn term(self) -> Result<(), QueueError> {
        self.respond(AckKind::Term).await
    }
}
