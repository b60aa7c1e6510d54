//! Format consumer
//!
//! Joins the `worker` queue group on `format.foo` and logs each message.
//! Set `HEALTH_PORT` to also serve probes.

use core_config::{env_optional, ConfigError, Environment, FromEnv, NatsConfig};
use domain_format::{FormatStream, FormatSubject, LogProcessor};
use eyre::{Result, WrapErr};
use messaging::{
    retry_when, ConsumerSpec, ErrorCategory, QueueError, Raw, RetryConfig, StreamSpec,
    SubjectMode, SubjectNamespace, Worker, WorkerConfig,
};
use nats_worker::{connect_with_retry, shutdown_channel, HealthServer, JetStreamBroker};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub nats: NatsConfig,
    pub health_port: Option<u16>,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        let health_port = env_optional("HEALTH_PORT")
            .map(|port| {
                port.parse().map_err(|e: std::num::ParseIntError| ConfigError::ParseError {
                    key: "HEALTH_PORT".to_string(),
                    details: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            nats: NatsConfig::from_env()?.with_connection_name("format-consumer"),
            health_port,
        })
    }
}

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    info!(?environment, nats = ?config.nats, "Starting format consumer");

    let shutdown = shutdown_channel();
    let health = config.health_port.map(HealthServer::new);
    let state = health.as_ref().map(HealthServer::state);
    if let Some(health) = health {
        let health_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = health.run(health_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        });
    }

    let client = connect_with_retry(&config.nats, RetryConfig::new())
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    let broker = JetStreamBroker::new(client);

    let namespace =
        SubjectNamespace::<FormatSubject>::new(SubjectMode::from_debug(config.nats.debug));
    let stream = StreamSpec::from_stream::<FormatStream>();
    let consumer = ConsumerSpec::from_stream::<FormatStream>(namespace.render(FormatSubject::Foo));
    let worker_config = WorkerConfig::from_stream::<FormatStream>();

    let mut worker: Worker<_, Raw> = retry_when(
        || Worker::new(broker.clone(), &stream, consumer.clone(), worker_config.clone()),
        RetryConfig::new(),
        |e| e.category() != ErrorCategory::Permanent,
    )
    .await
    .wrap_err("Failed to provision FORMAT consumer")?;
    if let Some(state) = &state {
        state.set_subscribed(true).await;
    }
    info!(filter = %consumer.filter_subject, "Listening");

    let result = worker.listen(shutdown, &LogProcessor).await;

    if let Err(e) = worker.close().await {
        warn!(error = %e, "Failed to leave queue group");
    }
    if let Err(e) = broker.shutdown().await {
        warn!(error = %e, "Failed to flush NATS connection");
    }

    match result {
        Ok(()) | Err(QueueError::Cancelled) => {
            info!("Format consumer stopped");
            Ok(())
        }
        Err(e) => Err(e).wrap_err("Consumer stopped"),
    }
}
