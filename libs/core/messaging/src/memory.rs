//! In-process broker for tests.
//!
//! Mirrors the JetStream behavior the workers rely on:
//! - subject matching against stream patterns and consumer filters
//! - durable consumers shared by queue-group members, one member per message
//! - explicit acks with `max_ack_pending` back-pressure
//! - NAK (optionally delayed) and ack-wait redelivery
//! - work-queue retention and unique consumer filters on work-queue streams
//!
//! Redelivery is evaluated lazily whenever a member asks for its next message.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::broker::{Broker, Delivery, PublishReceipt, StreamHandle, StreamInfo, Subscription};
use crate::config::{ConsumerSpec, PublishMode, Retention, StreamSpec, SubjectDrift};
use crate::error::QueueError;
use crate::subject;

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    streams: BTreeMap<String, MemStream>,
    next_inbox: u64,
}

struct MemStream {
    spec: StreamSpec,
    last_sequence: u64,
    retained: BTreeMap<u64, Stored>,
    bytes: u64,
    consumers: BTreeMap<String, MemConsumer>,
}

struct MemConsumer {
    spec: ConsumerSpec,
    deliver_subject: String,
    ready: VecDeque<Stored>,
    in_flight: BTreeMap<u64, InFlight>,
    members: usize,
    notify: Arc<Notify>,
}

#[derive(Clone)]
struct Stored {
    sequence: u64,
    subject: String,
    payload: Arc<[u8]>,
    delivered: u64,
}

struct InFlight {
    message: Stored,
    deadline: Instant,
    /// NAK'ed with a delay; no longer owned by a member
    released: bool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the provisioned streams.
    pub async fn stream_names(&self) -> Vec<String> {
        self.shared.state.lock().await.streams.keys().cloned().collect()
    }

    /// Durable names on a stream.
    pub async fn consumer_names(&self, stream: &str) -> Vec<String> {
        self.shared
            .state
            .lock()
            .await
            .streams
            .get(stream)
            .map(|s| s.consumers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Subjects of messages currently retained by a stream, in sequence order.
    pub async fn retained_subjects(&self, stream: &str) -> Vec<String> {
        self.shared
            .state
            .lock()
            .await
            .streams
            .get(stream)
            .map(|s| s.retained.values().map(|m| m.subject.clone()).collect())
            .unwrap_or_default()
    }

    /// Payloads currently retained by a stream, in sequence order.
    pub async fn retained_payloads(&self, stream: &str) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .await
            .streams
            .get(stream)
            .map(|s| s.retained.values().map(|m| m.payload.to_vec()).collect())
            .unwrap_or_default()
    }

    /// Deliveries outstanding (unacked) on a consumer.
    pub async fn pending_acks(&self, stream: &str, durable: &str) -> usize {
        self.shared
            .state
            .lock()
            .await
            .streams
            .get(stream)
            .and_then(|s| s.consumers.get(durable))
            .map(|c| c.in_flight.len())
            .unwrap_or_default()
    }
}

impl MemStream {
    fn new(spec: StreamSpec) -> Self {
        Self {
            spec,
            last_sequence: 0,
            retained: BTreeMap::new(),
            bytes: 0,
            consumers: BTreeMap::new(),
        }
    }

    fn handle(&self) -> StreamHandle {
        StreamHandle {
            name: self.spec.name.clone(),
            subjects: self.spec.subjects.clone(),
        }
    }

    fn remove(&mut self, sequence: u64) {
        if let Some(message) = self.retained.remove(&sequence) {
            self.bytes = self.bytes.saturating_sub(message.payload.len() as u64);
        }
    }
}

impl MemConsumer {
    fn matches(&self, subject: &str) -> bool {
        subject::matches(&self.spec.filter_subject, subject)
    }

    /// Move released or timed-out deliveries back to the ready queue.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        // Oldest first at the front
        for seq in expired.into_iter().rev() {
            if let Some(flight) = self.in_flight.remove(&seq) {
                self.ready.push_front(flight.message);
            }
        }
    }

    fn has_capacity(&self) -> bool {
        self.spec.max_ack_pending <= 0 || (self.in_flight.len() as i64) < self.spec.max_ack_pending
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.deadline).min()
    }

    fn wake(&self) {
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    type Subscription = MemorySubscription;

    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<StreamHandle, QueueError> {
        spec.validate()?;
        let mut state = self.shared.state.lock().await;

        if let Some(existing) = state.streams.get_mut(&spec.name) {
            let mut current = existing.spec.subjects.clone();
            current.sort();
            let mut requested = spec.subjects.clone();
            requested.sort();
            if current != requested {
                match spec.drift {
                    SubjectDrift::Warn => {
                        warn!(
                            stream = %spec.name,
                            existing = ?existing.spec.subjects,
                            requested = ?spec.subjects,
                            "Stream subjects differ from requested set"
                        );
                    }
                    SubjectDrift::Reconcile => {
                        for s in &spec.subjects {
                            if !existing.spec.subjects.contains(s) {
                                existing.spec.subjects.push(s.clone());
                            }
                        }
                    }
                    SubjectDrift::Fail => {
                        return Err(QueueError::stream(
                            &spec.name,
                            format!(
                                "existing subjects {:?} differ from requested {:?}",
                                existing.spec.subjects, spec.subjects
                            ),
                        ));
                    }
                }
            }
            return Ok(existing.handle());
        }

        for other in state.streams.values() {
            for theirs in &other.spec.subjects {
                if let Some(ours) = spec.subjects.iter().find(|s| subject::overlaps(s, theirs)) {
                    return Err(QueueError::stream(
                        &spec.name,
                        format!(
                            "subjects overlap with stream '{}' ('{}' vs '{}')",
                            other.spec.name, ours, theirs
                        ),
                    ));
                }
            }
        }

        debug!(stream = %spec.name, subjects = ?spec.subjects, "Creating stream");
        let stream = MemStream::new(spec.clone());
        let handle = stream.handle();
        state.streams.insert(spec.name.clone(), stream);
        Ok(handle)
    }

    async fn ensure_consumer(
        &self,
        stream: &StreamHandle,
        spec: &ConsumerSpec,
    ) -> Result<MemorySubscription, QueueError> {
        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        let inbox = state.next_inbox;

        let mem_stream = state
            .streams
            .get_mut(&stream.name)
            .ok_or_else(|| QueueError::stream(&stream.name, "stream not found"))?;
        spec.validate(&mem_stream.spec.subjects)?;

        if let Some(existing) = mem_stream.consumers.get_mut(&spec.durable) {
            if existing.spec.filter_subject != spec.filter_subject {
                return Err(QueueError::consumer(
                    &spec.durable,
                    format!(
                        "existing durable filters '{}', requested '{}'",
                        existing.spec.filter_subject, spec.filter_subject
                    ),
                ));
            }
            existing.members += 1;
            debug!(
                consumer = %spec.durable,
                deliver_subject = %existing.deliver_subject,
                members = existing.members,
                "Bound to existing consumer"
            );
            return Ok(MemorySubscription {
                shared: self.shared.clone(),
                stream: stream.name.clone(),
                durable: spec.durable.clone(),
                notify: existing.notify.clone(),
            });
        }

        if mem_stream.spec.retention == Retention::WorkQueue {
            if let Some(other) = mem_stream
                .consumers
                .values()
                .find(|c| subject::overlaps(&c.spec.filter_subject, &spec.filter_subject))
            {
                return Err(QueueError::consumer(
                    &spec.durable,
                    format!(
                        "filtered consumer not unique on workqueue stream (overlaps '{}')",
                        other.spec.durable
                    ),
                ));
            }
        }

        let ready: VecDeque<Stored> = mem_stream
            .retained
            .values()
            .filter(|m| subject::matches(&spec.filter_subject, &m.subject))
            .cloned()
            .collect();
        let consumer = MemConsumer {
            spec: spec.clone(),
            deliver_subject: format!("_INBOX.memory.{}", inbox),
            ready,
            in_flight: BTreeMap::new(),
            members: 1,
            notify: Arc::new(Notify::new()),
        };
        let notify = consumer.notify.clone();
        debug!(
            consumer = %spec.durable,
            filter = %spec.filter_subject,
            backlog = consumer.ready.len(),
            "Created consumer"
        );
        mem_stream.consumers.insert(spec.durable.clone(), consumer);
        state.next_inbox += 1;

        Ok(MemorySubscription {
            shared: self.shared.clone(),
            stream: stream.name.clone(),
            durable: spec.durable.clone(),
            notify,
        })
    }

    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        mode: PublishMode,
    ) -> Result<PublishReceipt, QueueError> {
        subject::validate_publish(subject)?;
        let mut state = self.shared.state.lock().await;

        let stream = state
            .streams
            .values_mut()
            .find(|s| s.spec.captures(subject))
            .ok_or_else(|| QueueError::publish(subject, "no stream captures subject"))?;

        let size = payload.len() as u64;
        if stream.spec.max_bytes > 0 && stream.bytes + size > stream.spec.max_bytes as u64 {
            return Err(QueueError::publish(subject, "maximum bytes exceeded"));
        }

        stream.last_sequence += 1;
        let message = Stored {
            sequence: stream.last_sequence,
            subject: subject.to_string(),
            payload: Arc::from(payload),
            delivered: 0,
        };

        let mut interested = false;
        for consumer in stream.consumers.values_mut().filter(|c| c.matches(subject)) {
            consumer.ready.push_back(message.clone());
            consumer.wake();
            interested = true;
        }

        let retain = match stream.spec.retention {
            Retention::Interest => interested,
            Retention::WorkQueue | Retention::Limits => true,
        };
        if retain {
            stream.bytes += size;
            stream.retained.insert(message.sequence, message.clone());
        }

        Ok(match mode {
            PublishMode::Buffered => PublishReceipt::buffered(subject),
            PublishMode::Acknowledged => PublishReceipt {
                subject: subject.to_string(),
                stream: Some(stream.spec.name.clone()),
                sequence: Some(message.sequence),
            },
        })
    }

    async fn stream_info(&self, name: &str) -> Result<StreamInfo, QueueError> {
        let state = self.shared.state.lock().await;
        let stream = state
            .streams
            .get(name)
            .ok_or_else(|| QueueError::stream(name, "stream not found"))?;
        Ok(StreamInfo {
            name: stream.spec.name.clone(),
            subjects: stream.spec.subjects.clone(),
            messages: stream.retained.len() as u64,
            bytes: stream.bytes,
            consumers: stream.consumers.len(),
        })
    }
}

pub struct MemorySubscription {
    shared: Arc<Shared>,
    stream: String,
    durable: String,
    notify: Arc<Notify>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    type Delivery = MemoryDelivery;

    async fn next(&mut self) -> Result<MemoryDelivery, QueueError> {
        loop {
            let deadline = {
                let mut state = self.shared.state.lock().await;
                let consumer = state
                    .streams
                    .get_mut(&self.stream)
                    .and_then(|s| s.consumers.get_mut(&self.durable))
                    .ok_or(QueueError::Closed)?;

                let now = Instant::now();
                consumer.requeue_expired(now);

                while consumer.has_capacity() {
                    let Some(mut message) = consumer.ready.pop_front() else {
                        break;
                    };
                    message.delivered += 1;
                    if consumer.spec.max_deliver > 0
                        && message.delivered as i64 > consumer.spec.max_deliver
                    {
                        debug!(
                            consumer = %self.durable,
                            sequence = message.sequence,
                            "Max deliveries reached, dropping from consumer"
                        );
                        continue;
                    }
                    consumer.in_flight.insert(
                        message.sequence,
                        InFlight {
                            message: message.clone(),
                            deadline: now + consumer.spec.ack_wait,
                            released: false,
                        },
                    );
                    return Ok(MemoryDelivery {
                        shared: self.shared.clone(),
                        stream: self.stream.clone(),
                        durable: self.durable.clone(),
                        message,
                    });
                }

                consumer.next_deadline()
            };

            match deadline {
                Some(at) => {
                    let _ = tokio::time::timeout_at(at, self.notify.notified()).await;
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn close(self) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock().await;
        if let Some(consumer) = state
            .streams
            .get_mut(&self.stream)
            .and_then(|s| s.consumers.get_mut(&self.durable))
        {
            consumer.members = consumer.members.saturating_sub(1);
            // Durable survives with zero members, like a JetStream durable
            consumer.wake();
        }
        Ok(())
    }
}

pub struct MemoryDelivery {
    shared: Arc<Shared>,
    stream: String,
    durable: String,
    message: Stored,
}

impl MemoryDelivery {
    /// Remove the in-flight entry this delivery owns, if still current.
    async fn settle<F>(self, on_settled: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut MemStream, Stored) + Send,
    {
        let mut state = self.shared.state.lock().await;
        let Some(stream) = state.streams.get_mut(&self.stream) else {
            return Ok(());
        };
        let Some(consumer) = stream.consumers.get_mut(&self.durable) else {
            return Ok(());
        };
        let current = consumer.in_flight.get(&self.message.sequence).is_some_and(|f| {
            !f.released && f.message.delivered == self.message.delivered
        });
        if !current {
            // Stale: already redelivered to someone else
            return Ok(());
        }
        if let Some(flight) = consumer.in_flight.remove(&self.message.sequence) {
            consumer.wake();
            on_settled(stream, flight.message);
        }
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn subject(&self) -> &str {
        &self.message.subject
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn sequence(&self) -> u64 {
        self.message.sequence
    }

    fn delivered(&self) -> u64 {
        self.message.delivered
    }

    async fn ack(self) -> Result<(), QueueError> {
        self.settle(|stream, message| {
            if stream.spec.retention != Retention::Limits {
                stream.remove(message.sequence);
            }
        })
        .await
    }

    async fn nak(self, delay: Option<Duration>) -> Result<(), QueueError> {
        let durable = self.durable.clone();
        let delay = delay.filter(|d| !d.is_zero());
        self.settle(move |stream, message| {
            let Some(consumer) = stream.consumers.get_mut(&durable) else {
                return;
            };
            match delay {
                None => consumer.ready.push_front(message),
                Some(delay) => {
                    consumer.in_flight.insert(
                        message.sequence,
                        InFlight {
                            message,
                            deadline: Instant::now() + delay,
                            released: true,
                        },
                    );
                }
            }
        })
        .await
    }

    async fn term(self) -> Result<(), QueueError> {
        self.settle(|stream, message| {
            if stream.spec.retention != Retention::Limits {
                stream.remove(message.sequence);
            }
        })
        .await
    }
}
