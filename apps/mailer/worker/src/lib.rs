//! Mailer worker
//!
//! Joins the SMTP queue group and delivers every queued email.
//!
//! ```text
//! SMTP stream (*.smtp.>)
//!   ↓ durable push consumer, deliver group = durable
//! Worker<JetStreamBroker, Email>
//!   ↓
//! EmailProcessor ──▶ SmtpSender (STARTTLS) | LogSender (no SMTP_URL)
//! ```
//!
//! Failed emails are retried with backoff or dead-lettered to `SMTP_DLQ`,
//! depending on `WORKER_FAILURE_POLICY`.

pub mod config;

use core_config::{Environment, FromEnv};
use email::{EmailProcessor, LogSender, Sender, SmtpSender, SmtpStream, SmtpSubject};
use eyre::{Result, WrapErr};
use messaging::{
    init_metrics, retry_when, ErrorCategory, Processor, QueueError, RetryConfig,
    StreamConfig, SubjectMode, SubjectNamespace, Worker,
};
use nats_worker::{
    connect_with_retry, shutdown_channel, HealthServer, HealthState, JetStreamBroker,
};
use tracing::{error, info, warn};

use crate::config::Config;

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    info!(
        ?environment,
        nats = ?config.nats,
        durable = %config.durable,
        policy = %config.failure_policy,
        "Starting mailer worker"
    );

    match config.smtp_url.as_deref() {
        Some(url) => {
            let sender = SmtpSender::from_url(url).wrap_err("Invalid SMTP_URL")?;
            serve(config, sender).await
        }
        None => {
            warn!("SMTP_URL not set, emails will only be logged");
            serve(config, LogSender).await
        }
    }
}

async fn serve<S: Sender + 'static>(config: Config, sender: S) -> Result<()> {
    let metrics = init_metrics().wrap_err("Failed to install metrics recorder")?;
    let health = HealthServer::new(config.health.port).with_metrics(metrics);
    let state = health.state();

    let shutdown = shutdown_channel();
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = health.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let processor = EmailProcessor::new(sender);
    if !processor.health_check().await.unwrap_or(false) {
        warn!(sender = processor.sender().name(), "Email sender is not reachable yet");
        state
            .set_error(Some(format!("{} sender unreachable", processor.sender().name())))
            .await;
    }

    let client = connect_with_retry(&config.nats, RetryConfig::new())
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    let broker = JetStreamBroker::new(client);

    let namespace =
        SubjectNamespace::<SmtpSubject>::new(SubjectMode::from_debug(config.nats.debug));
    let stream = config.stream();
    let consumer = config.consumer(namespace.render(SmtpSubject::All));
    let worker_config = config.worker();

    info!(
        stream = SmtpStream::STREAM_NAME,
        consumer = %consumer.durable,
        filter = %consumer.filter_subject,
        "Provisioning worker"
    );

    let mut worker: Worker<_, email::Email> = retry_when(
        || Worker::new(broker.clone(), &stream, consumer.clone(), worker_config.clone()),
        RetryConfig::new(),
        |e| e.category() != ErrorCategory::Permanent,
    )
    .await
    .wrap_err("Failed to provision SMTP consumer")?;
    state.set_subscribed(true).await;

    let result = worker.listen(shutdown, &processor).await;
    record_outcome(&state, &result).await;
    if let Err(e) = worker.close().await {
        warn!(error = %e, "Failed to leave queue group");
    }
    if let Err(e) = broker.shutdown().await {
        warn!(error = %e, "Failed to flush NATS connection");
    }

    match result {
        Ok(()) | Err(QueueError::Cancelled) => {
            info!("Mailer worker stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Worker stopped on error");
            Err(e).wrap_err("Worker stopped")
        }
    }
}

/// Reflect how the listener stopped in the probe state.
async fn record_outcome(state: &HealthState, result: &Result<(), QueueError>) {
    state.set_subscribed(false).await;
    match result {
        Ok(()) | Err(QueueError::Cancelled) => {}
        Err(e) => {
            state.set_processor_healthy(false).await;
            state.set_error(Some(e.to_string())).await;
        }
    }
}
