//! NATS JetStream backend for the `messaging` work-queue primitives.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌─────────────────────┐     ┌────────────────┐
//! │   Producer     │────▶│   NATS JetStream    │────▶│     Worker     │
//! │  (messaging)   │     │  (work-queue stream)│     │  (messaging)   │
//! └────────────────┘     └─────────────────────┘     └────────────────┘
//!                                  │                         │
//!                                  ▼                         ▼
//!                        ┌─────────────────┐        ┌────────────────┐
//!                        │   DLQ Stream    │        │   Processor    │
//!                        │  (Dead Letters) │        │  (Your Logic)  │
//!                        └─────────────────┘        └────────────────┘
//! ```
//!
//! - **JetStreamBroker**: idempotent stream and durable push-consumer
//!   provisioning, publishes with optional stream acknowledgment
//! - **Queue groups**: every worker sharing a durable name joins the same
//!   deliver group, so each message reaches exactly one of them
//! - **Health Endpoints**: K8s-ready liveness/readiness probes and `/metrics`
//!
//! # Example
//!
//! ```rust,ignore
//! use nats_worker::{connect_with_retry, JetStreamBroker};
//! use messaging::{RetryConfig, Worker, WorkerConfig};
//!
//! let client = connect_with_retry(&nats_config, RetryConfig::new()).await?;
//! let broker = JetStreamBroker::new(client);
//!
//! let mut worker: Worker<_, Email> =
//!     Worker::new(broker.clone(), &stream, consumer, WorkerConfig::from_stream::<SmtpStream>()).await?;
//! let result = worker.listen(shutdown_rx, &processor).await;
//! worker.close().await?;
//! broker.shutdown().await?;
//! ```

mod broker;
mod connection;
mod error;
mod health;
mod shutdown;
mod subscription;

pub use broker::JetStreamBroker;
pub use connection::{connect, connect_with_retry};
pub use health::{HealthServer, HealthState, HealthStatus};
pub use shutdown::{shutdown_channel, shutdown_signal, wait_for_shutdown};
pub use subscription::{JetStreamDelivery, JetStreamSubscription};
