//! Mailer API
//!
//! Accepts email requests over HTTP, validates them and publishes them to
//! the `SMTP` stream for the mailer worker.
//!
//! ```text
//! POST /api/subscribe ──▶ Email::from_slice ──▶ Producer (ack) ──▶ *.smtp.subscribe
//! ```

pub mod config;
pub mod error;
pub mod handlers;

use core_config::{Environment, FromEnv};
use email::{SmtpStream, SmtpSubject};
use eyre::{Result, WrapErr};
use messaging::{
    retry_when, ErrorCategory, Producer, PublishMode, RetryConfig, StreamSpec, SubjectMode,
    SubjectNamespace,
};
use nats_worker::{connect_with_retry, shutdown_channel, wait_for_shutdown, JetStreamBroker};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    info!(?environment, nats = ?config.nats, "Starting mailer API");

    let client = connect_with_retry(&config.nats, RetryConfig::new())
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    let broker = JetStreamBroker::new(client);

    let namespace = SubjectNamespace::<SmtpSubject>::new(SubjectMode::from_debug(config.nats.debug));
    let stream = StreamSpec::from_stream::<SmtpStream>();
    let producer = retry_when(
        || Producer::new(broker.clone(), namespace, &stream),
        RetryConfig::new(),
        |e| e.category() != ErrorCategory::Permanent,
    )
    .await
    .wrap_err("Failed to provision SMTP stream")?
    .with_mode(PublishMode::Acknowledged);

    let app = handlers::router(producer).layer(TraceLayer::new_for_http());

    let shutdown = shutdown_channel();
    let listener = tokio::net::TcpListener::bind(config.server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind {}", config.server.address()))?;
    info!(addr = %config.server.address(), "Listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .wrap_err("HTTP server failed");

    broker.shutdown().await.wrap_err("Failed to flush NATS connection")?;
    info!("Mailer API stopped");
    served
}
