//! Broker capability interface.
//!
//! Producers, workers and the dead letter queue only talk to a [`Broker`].
//! `nats_worker::JetStreamBroker` implements it over JetStream,
//! [`crate::memory::InMemoryBroker`] in process for tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ConsumerSpec, PublishMode, StreamSpec};
use crate::error::QueueError;

/// A provisioned stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub name: String,
    /// Subjects the stream actually captures (after drift handling)
    pub subjects: Vec<String>,
}

/// Point-in-time stream state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub name: String,
    pub subjects: Vec<String>,
    pub messages: u64,
    pub bytes: u64,
    pub consumers: usize,
}

/// Outcome of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub subject: String,
    /// Stream and sequence, known only for acknowledged publishes
    pub stream: Option<String>,
    pub sequence: Option<u64>,
}

impl PublishReceipt {
    pub fn buffered(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            stream: None,
            sequence: None,
        }
    }
}

#[async_trait]
pub trait Broker: Clone + Send + Sync + 'static {
    type Subscription: Subscription;

    /// Create the stream if absent; reconcile subjects per the drift policy.
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<StreamHandle, QueueError>;

    /// Create or look up the durable and bind a queue-group member to it.
    async fn ensure_consumer(
        &self,
        stream: &StreamHandle,
        spec: &ConsumerSpec,
    ) -> Result<Self::Subscription, QueueError>;

    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        mode: PublishMode,
    ) -> Result<PublishReceipt, QueueError>;

    async fn stream_info(&self, name: &str) -> Result<StreamInfo, QueueError>;
}

/// One queue-group member's view of a durable consumer.
#[async_trait]
pub trait Subscription: Send + 'static {
    type Delivery: Delivery;

    /// Wait for the next delivery. Must be cancel safe.
    async fn next(&mut self) -> Result<Self::Delivery, QueueError>;

    /// Leave the queue group. Unacked deliveries are redelivered by the broker.
    async fn close(self) -> Result<(), QueueError>;
}

/// A delivered message awaiting acknowledgment.
#[async_trait]
pub trait Delivery: Send + 'static {
    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    /// Stream sequence of the underlying message.
    fn sequence(&self) -> u64;

    /// Delivery attempt, starting at 1.
    fn delivered(&self) -> u64;

    async fn ack(self) -> Result<(), QueueError>;

    /// Negative ack; redeliver after `delay` (immediately when `None`).
    async fn nak(self, delay: Option<Duration>) -> Result<(), QueueError>;

    /// Stop redelivering this message.
    async fn term(self) -> Result<(), QueueError>;
}
