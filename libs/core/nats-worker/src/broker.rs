//! JetStream implementation of [`messaging::Broker`].

use async_nats::jetstream::{self, consumer, consumer::push, stream, Context};
use async_nats::Client;
use async_trait::async_trait;
use messaging::{
    AckPolicy, Broker, ConsumerSpec, PublishMode, PublishReceipt, QueueError, Retention,
    StreamHandle, StreamInfo, StreamSpec, SubjectDrift,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{is_consumer_exists, is_stream_exists, is_stream_not_found};
use crate::subscription::JetStreamSubscription;

/// Broker backed by a NATS JetStream context.
///
/// Cheap to clone; every clone shares the same connection.
#[derive(Clone)]
pub struct JetStreamBroker {
    client: Client,
    jetstream: Context,
}

impl JetStreamBroker {
    pub fn new(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn jetstream(&self) -> &Context {
        &self.jetstream
    }

    /// Flush buffered publishes. The connection closes when the last clone
    /// is dropped.
    pub async fn shutdown(self) -> Result<(), QueueError> {
        self.client
            .flush()
            .await
            .map_err(|e| QueueError::Connection(format!("flush failed: {}", e)))?;
        info!("NATS connection flushed");
        Ok(())
    }

    async fn reconcile(
        &self,
        stream: &mut stream::Stream,
        spec: &StreamSpec,
    ) -> Result<StreamHandle, QueueError> {
        let info = stream
            .info()
            .await
            .map_err(|e| QueueError::stream(&spec.name, e))?
            .clone();

        let existing = info.config.subjects.clone();
        let missing: Vec<&String> = spec
            .subjects
            .iter()
            .filter(|s| !existing.contains(s))
            .collect();
        let extra = existing.iter().any(|s| !spec.subjects.contains(s));

        if missing.is_empty() && !extra {
            debug!(stream = %spec.name, "Stream already exists");
            return Ok(StreamHandle {
                name: spec.name.clone(),
                subjects: existing,
            });
        }

        match spec.drift {
            SubjectDrift::Warn => {
                warn!(
                    stream = %spec.name,
                    existing = ?existing,
                    requested = ?spec.subjects,
                    "Stream subjects differ from requested set"
                );
                Ok(StreamHandle {
                    name: spec.name.clone(),
                    subjects: existing,
                })
            }
            SubjectDrift::Reconcile => {
                let mut config = info.config.clone();
                config.subjects.extend(missing.into_iter().cloned());

                let updated = self
                    .jetstream
                    .update_stream(&config)
                    .await
                    .map_err(|e| QueueError::stream(&spec.name, e))?;

                info!(stream = %spec.name, subjects = ?updated.config.subjects, "Stream subjects reconciled");
                Ok(StreamHandle {
                    name: spec.name.clone(),
                    subjects: updated.config.subjects,
                })
            }
            SubjectDrift::Fail => Err(QueueError::stream(
                &spec.name,
                format!(
                    "existing subjects {:?} differ from requested {:?}",
                    existing, spec.subjects
                ),
            )),
        }
    }
}

fn retention_policy(retention: Retention) -> stream::RetentionPolicy {
    match retention {
        Retention::WorkQueue => stream::RetentionPolicy::WorkQueue,
        Retention::Limits => stream::RetentionPolicy::Limits,
        Retention::Interest => stream::RetentionPolicy::Interest,
    }
}

fn ack_policy(policy: AckPolicy) -> consumer::AckPolicy {
    match policy {
        AckPolicy::Explicit => consumer::AckPolicy::Explicit,
        AckPolicy::All => consumer::AckPolicy::All,
        AckPolicy::None => consumer::AckPolicy::None,
    }
}

fn stream_config(spec: &StreamSpec) -> stream::Config {
    stream::Config {
        name: spec.name.clone(),
        subjects: spec.subjects.clone(),
        retention: retention_policy(spec.retention),
        max_bytes: spec.max_bytes,
        storage: stream::StorageType::File,
        ..Default::default()
    }
}

fn push_config(spec: &ConsumerSpec, deliver_subject: String) -> push::Config {
    push::Config {
        durable_name: Some(spec.durable.clone()),
        deliver_subject,
        deliver_group: Some(spec.deliver_group().to_string()),
        filter_subject: spec.filter_subject.clone(),
        ack_policy: ack_policy(spec.ack_policy),
        ack_wait: spec.ack_wait,
        max_deliver: spec.max_deliver,
        max_ack_pending: spec.max_ack_pending,
        ..Default::default()
    }
}

#[async_trait]
impl Broker for JetStreamBroker {
    type Subscription = JetStreamSubscription;

    #[instrument(skip(self, spec), fields(stream = %spec.name))]
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<StreamHandle, QueueError> {
        spec.validate()?;

        match self.jetstream.get_stream(&spec.name).await {
            Ok(mut stream) => self.reconcile(&mut stream, spec).await,
            Err(e) if is_stream_not_found(&e) => {
                match self.jetstream.create_stream(stream_config(spec)).await {
                    Ok(stream) => {
                        let subjects = stream.cached_info().config.subjects.clone();
                        info!(
                            stream = %spec.name,
                            subjects = ?subjects,
                            retention = %spec.retention,
                            max_bytes = spec.max_bytes,
                            "Created stream"
                        );
                        Ok(StreamHandle {
                            name: spec.name.clone(),
                            subjects,
                        })
                    }
                    Err(e) if is_stream_exists(&e) => {
                        debug!(stream = %spec.name, "Stream created concurrently");
                        let mut stream = self
                            .jetstream
                            .get_stream(&spec.name)
                            .await
                            .map_err(|e| QueueError::stream(&spec.name, e))?;
                        self.reconcile(&mut stream, spec).await
                    }
                    Err(e) => Err(QueueError::stream(&spec.name, e)),
                }
            }
            Err(e) => Err(QueueError::stream(&spec.name, e)),
        }
    }

    #[instrument(skip(self, stream, spec), fields(stream = %stream.name, consumer = %spec.durable))]
    async fn ensure_consumer(
        &self,
        stream: &StreamHandle,
        spec: &ConsumerSpec,
    ) -> Result<JetStreamSubscription, QueueError> {
        spec.validate(&stream.subjects)?;

        let js_stream = self
            .jetstream
            .get_stream(&stream.name)
            .await
            .map_err(|e| QueueError::consumer(&spec.durable, e))?;

        let inbox = self.client.new_inbox();
        let config = push_config(spec, inbox.clone());

        let consumer = match js_stream
            .get_or_create_consumer(&spec.durable, config.clone())
            .await
        {
            Ok(consumer) => consumer,
            Err(e) if is_consumer_exists(&e) => js_stream
                .get_or_create_consumer(&spec.durable, config)
                .await
                .map_err(|e| QueueError::consumer(&spec.durable, e))?,
            Err(e) => return Err(QueueError::consumer(&spec.durable, e)),
        };

        let existing = consumer.cached_info().config.clone();
        if existing.filter_subject != spec.filter_subject {
            return Err(QueueError::consumer(
                &spec.durable,
                format!(
                    "existing durable filters '{}', requested '{}'",
                    existing.filter_subject, spec.filter_subject
                ),
            ));
        }

        if existing.deliver_subject.as_deref() == Some(inbox.as_str()) {
            info!(
                deliver_subject = %inbox,
                filter = %spec.filter_subject,
                "Created durable consumer"
            );
        } else {
            debug!(
                deliver_subject = ?existing.deliver_subject,
                "Bound to existing durable consumer"
            );
        }

        let messages = consumer
            .messages()
            .await
            .map_err(|e| QueueError::Subscription(e.to_string()))?;

        Ok(JetStreamSubscription::new(messages, &spec.durable))
    }

    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        mode: PublishMode,
    ) -> Result<PublishReceipt, QueueError> {
        let pending = self
            .jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| QueueError::publish(subject, e))?;

        match mode {
            PublishMode::Buffered => Ok(PublishReceipt::buffered(subject)),
            PublishMode::Acknowledged => {
                let ack = pending.await.map_err(|e| QueueError::publish(subject, e))?;
                Ok(PublishReceipt {
                    subject: subject.to_string(),
                    stream: Some(ack.stream),
                    sequence: Some(ack.sequence),
                })
            }
        }
    }

    async fn stream_info(&self, name: &str) -> Result<StreamInfo, QueueError> {
        let mut stream = self
            .jetstream
            .get_stream(name)
            .await
            .map_err(|e| QueueError::stream(name, e))?;
        let info = stream
            .info()
            .await
            .map_err(|e| QueueError::stream(name, e))?;

        Ok(StreamInfo {
            name: info.config.name.clone(),
            subjects: info.config.subjects.clone(),
            messages: info.state.messages,
            bytes: info.state.bytes,
            consumers: info.state.consumer_count,
        })
    }
}
