//! Broker-agnostic work-queue primitives.
//!
//! - **Subjects**: closed, validated subject enumerations rendered per environment
//! - **Provisioning**: idempotent stream and durable consumer setup
//! - **Producer**: validated, encoded publishes
//! - **Worker**: queue-group consumption with explicit acks, retry and DLQ
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌─────────────────────────────────────┐
//! │  Domain crates       │      │             Brokers                 │
//! │                      │      │                                     │
//! │  SmtpSubject, Email  │      │  ┌──────────────┐ ┌──────────────┐  │
//! │  EmailProcessor ─────│──────│─▶│ JetStream    │ │ InMemory     │  │
//! │                      │      │  │ (nats-worker)│ │ (tests)      │  │
//! │  Producer / Worker ──│──────│─▶└──────────────┘ └──────────────┘  │
//! │                      │      │       same `Broker` trait            │
//! └──────────────────────┘      └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{Json, Producer, StreamSpec, SubjectMode, SubjectNamespace, Worker};
//!
//! let namespace = SubjectNamespace::<SmtpSubject>::new(SubjectMode::Debug);
//! let stream = StreamSpec::from_stream::<SmtpStream>();
//!
//! let producer = Producer::new(broker.clone(), namespace, &stream).await?;
//! producer.publish(SmtpSubject::Subscribe, &email).await?;
//!
//! let consumer = ConsumerSpec::from_stream::<SmtpStream>(namespace.render(SmtpSubject::Subscribe));
//! let mut worker: Worker<_, Email> =
//!     Worker::new(broker, &stream, consumer, WorkerConfig::from_stream::<SmtpStream>()).await?;
//! worker.listen(shutdown_rx, &processor).await?;
//! ```

pub mod broker;
mod config;
mod dlq;
pub mod envelope;
mod error;
pub mod memory;
pub mod metrics;
mod processor;
mod producer;
pub mod retry;
pub mod subject;
mod worker;

pub use broker::{Broker, Delivery, PublishReceipt, StreamHandle, StreamInfo, Subscription};
pub use config::{
    AckPolicy, ConsumerSpec, FailurePolicy, PublishMode, Retention, StreamConfig, StreamSpec,
    SubjectDrift, WorkerConfig,
};
pub use dlq::{DeadLetter, DeadLetterQueue};
pub use envelope::{Envelope, Json, Raw};
pub use error::{EnvelopeError, ErrorCategory, ProcessingError, QueueError, Resource};
pub use memory::InMemoryBroker;
pub use metrics::{init_metrics, QueueMetrics};
pub use processor::{FailingProcessor, NoOpProcessor, Processor};
pub use producer::Producer;
pub use retry::{retry_when, retry_with_backoff, RetryConfig};
pub use subject::{InvalidSubject, SubjectKind, SubjectMode, SubjectNamespace};
pub use worker::Worker;
