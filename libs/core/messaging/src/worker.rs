//! Queue-group worker.
//!
//! ```text
//! Idle ──new()──▶ Pulling ──▶ Processing ──▶ Acking ──▶ Pulling
//!                    │                                     │
//!                    └──── shutdown / timeout ──▶ close() ─┴─▶ Closed
//! ```
//!
//! Only `Pulling` blocks. Acks are sent strictly after the processor
//! returns; what happens on failure is decided by [`FailurePolicy`].

use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Delivery, StreamHandle, Subscription};
use crate::config::{ConsumerSpec, FailurePolicy, StreamSpec, WorkerConfig};
use crate::dlq::{DeadLetter, DeadLetterQueue};
use crate::envelope::Envelope;
use crate::error::{ProcessingError, QueueError};
use crate::metrics::QueueMetrics;
use crate::processor::Processor;

/// Redelivery delay when a dead letter could not be published.
const DLQ_RETRY_DELAY: Duration = Duration::from_secs(5);

type DeliveryOf<B> = <<B as Broker>::Subscription as Subscription>::Delivery;

/// One member of a durable consumer's queue group, decoding `T` payloads.
pub struct Worker<B: Broker, T> {
    subscription: B::Subscription,
    stream: StreamHandle,
    consumer: ConsumerSpec,
    config: WorkerConfig,
    dlq: Option<DeadLetterQueue<B>>,
    metrics: QueueMetrics,
    _payload: PhantomData<fn() -> T>,
}

impl<B: Broker, T: Envelope> Worker<B, T> {
    /// Provision stream, dead letter stream and durable consumer, then bind.
    pub async fn new(
        broker: B,
        stream: &StreamSpec,
        consumer: ConsumerSpec,
        config: WorkerConfig,
    ) -> Result<Self, QueueError> {
        let handle = broker.ensure_stream(stream).await?;

        let dlq = match (&config.dlq_stream, config.failure_policy) {
            (Some(name), FailurePolicy::Isolate) => {
                let dlq = DeadLetterQueue::new(broker.clone(), name, &handle.name);
                dlq.ensure().await?;
                Some(dlq)
            }
            _ => None,
        };

        let subscription = broker.ensure_consumer(&handle, &consumer).await?;

        info!(
            stream = %handle.name,
            consumer = %consumer.durable,
            filter = %consumer.filter_subject,
            policy = %config.failure_policy,
            "Worker bound to consumer"
        );

        Ok(Self {
            metrics: QueueMetrics::new(&handle.name, &consumer.durable),
            subscription,
            stream: handle,
            consumer,
            config,
            dlq,
            _payload: PhantomData,
        })
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    pub fn consumer(&self) -> &ConsumerSpec {
        &self.consumer
    }

    /// Receive, decode and ack a single message.
    pub async fn next_msg(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<T, QueueError> {
        let delivery = self.pull(shutdown).await?;
        self.decode_and_ack(delivery).await
    }

    /// [`Self::next_msg`] giving up with `QueueError::Timeout` after `timeout`.
    pub async fn next_msg_within(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        timeout: Duration,
    ) -> Result<T, QueueError> {
        let delivery = tokio::time::timeout(timeout, self.pull(shutdown))
            .await
            .map_err(|_| QueueError::Timeout(timeout))??;
        self.decode_and_ack(delivery).await
    }

    /// Process messages until shutdown.
    ///
    /// Only returns with an error: `QueueError::Cancelled` once `shutdown`
    /// flips to `true`, or the failure that stopped a `FailFast` worker.
    pub async fn listen<P>(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        processor: &P,
    ) -> Result<(), QueueError>
    where
        P: Processor<T> + ?Sized,
    {
        info!(
            stream = %self.stream.name,
            consumer = %self.consumer.durable,
            processor = processor.name(),
            "Listening for messages"
        );

        loop {
            let delivery = match self.pull(&mut shutdown).await {
                Ok(delivery) => delivery,
                Err(QueueError::Cancelled) => {
                    info!(consumer = %self.consumer.durable, "Shutdown signal received, stopping listener");
                    return Err(QueueError::Cancelled);
                }
                Err(e) => {
                    error!(consumer = %self.consumer.durable, error = %e, "Subscription failed");
                    return Err(e);
                }
            };

            self.handle(delivery, processor).await?;
        }
    }

    /// Leave the queue group. Unacked messages go back to the broker.
    pub async fn close(self) -> Result<(), QueueError> {
        self.subscription.close().await?;
        info!(
            stream = %self.stream.name,
            consumer = %self.consumer.durable,
            "Worker closed"
        );
        Ok(())
    }

    async fn pull(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<DeliveryOf<B>, QueueError> {
        if *shutdown.borrow() {
            return Err(QueueError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancelled(shutdown) => Err(QueueError::Cancelled),
            delivery = self.subscription.next() => delivery,
        }
    }

    async fn decode_and_ack(&self, delivery: DeliveryOf<B>) -> Result<T, QueueError> {
        self.metrics.message_received();
        match T::decode(delivery.payload()) {
            Ok(payload) => {
                delivery.ack().await?;
                Ok(payload)
            }
            Err(e) => {
                let err = QueueError::Decode(e);
                self.quarantine(delivery, &err).await;
                Err(err)
            }
        }
    }

    async fn handle<P>(&self, delivery: DeliveryOf<B>, processor: &P) -> Result<(), QueueError>
    where
        P: Processor<T> + ?Sized,
    {
        self.metrics.message_received();
        let sequence = delivery.sequence();
        let delivered = delivery.delivered();

        let payload = match T::decode(delivery.payload()) {
            Ok(payload) => payload,
            Err(e) => {
                let err = QueueError::Decode(e);
                self.quarantine(delivery, &err).await;
                return match self.config.failure_policy {
                    FailurePolicy::FailFast => Err(err),
                    FailurePolicy::Isolate => Ok(()),
                };
            }
        };

        let start = Instant::now();
        match processor.process(&payload).await {
            Ok(()) => match delivery.ack().await {
                Ok(()) => {
                    self.metrics.message_processed(start.elapsed());
                    debug!(sequence, delivered, "Message processed");
                    Ok(())
                }
                Err(e) => {
                    self.metrics.ack_failed();
                    match self.config.failure_policy {
                        FailurePolicy::FailFast => Err(e),
                        FailurePolicy::Isolate => {
                            warn!(sequence, error = %e, "Ack failed, broker will redeliver");
                            Ok(())
                        }
                    }
                }
            },
            Err(err) => self.handle_failure(delivery, err).await,
        }
    }

    async fn handle_failure(
        &self,
        delivery: DeliveryOf<B>,
        err: ProcessingError,
    ) -> Result<(), QueueError> {
        let category = err.category();
        let sequence = delivery.sequence();
        let delivered = delivery.delivered();
        self.metrics.message_failed(&category.to_string());

        if self.config.failure_policy == FailurePolicy::FailFast {
            error!(sequence, delivered, error = %err, "Processing failed, stopping listener");
            return Err(QueueError::Processing(err));
        }

        let retry_count = u32::try_from(delivered.saturating_sub(1)).unwrap_or(u32::MAX);
        if err.should_retry(retry_count) {
            let delay = Duration::from_millis(err.backoff_delay_ms(retry_count));
            warn!(
                sequence,
                delivered,
                category = %category,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Processing failed, scheduling redelivery"
            );
            self.metrics.message_retried();
            if let Err(e) = delivery.nak(Some(delay)).await {
                self.metrics.ack_failed();
                warn!(sequence, error = %e, "Nak failed, broker will redeliver after ack wait");
            }
        } else {
            error!(
                sequence,
                delivered,
                category = %category,
                error = %err,
                "Processing failed, moving to DLQ"
            );
            self.dead_letter(delivery, &category.to_string(), &err.to_string())
                .await;
        }
        Ok(())
    }

    /// Undecodable message: dead-letter it, or leave it unacked under `FailFast`.
    async fn quarantine(&self, delivery: DeliveryOf<B>, err: &QueueError) {
        self.metrics.message_failed("decode");
        warn!(
            subject = %delivery.subject(),
            sequence = delivery.sequence(),
            error = %err,
            "Failed to decode message"
        );
        if self.config.failure_policy == FailurePolicy::Isolate {
            self.dead_letter(delivery, "decode", &err.to_string()).await;
        }
    }

    /// Record the message on the DLQ and terminate it.
    ///
    /// A message is only terminated once its dead letter is stored.
    async fn dead_letter(&self, delivery: DeliveryOf<B>, category: &str, error: &str) {
        let sequence = delivery.sequence();

        let Some(dlq) = &self.dlq else {
            warn!(sequence, "No DLQ configured, terminating message");
            if let Err(e) = delivery.term().await {
                warn!(sequence, error = %e, "Term failed");
            }
            return;
        };

        let entry = DeadLetter::from_delivery(
            &delivery,
            &self.stream.name,
            &self.consumer.durable,
            category,
            error,
        );
        match dlq.send(&entry).await {
            Ok(_) => {
                self.metrics.message_dead_lettered();
                if let Err(e) = delivery.term().await {
                    warn!(sequence, error = %e, "Term failed after dead-lettering");
                }
            }
            Err(e) => {
                error!(sequence, error = %e, "Failed to publish dead letter, redelivering");
                if let Err(e) = delivery.nak(Some(DLQ_RETRY_DELAY)).await {
                    warn!(sequence, error = %e, "Nak failed, broker will redeliver after ack wait");
                }
            }
        }
    }
}

/// Resolves once the shutdown flag is raised.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if shutdown.changed().await.is_err() {
            // Sender dropped without raising the flag; nothing can cancel us now
            std::future::pending::<()>().await;
        }
        if *shutdown.borrow() {
            return;
        }
    }
}
