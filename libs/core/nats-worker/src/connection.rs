//! Connecting to NATS from a [`NatsConfig`].

use async_nats::{Client, ConnectOptions, Event};
use core_config::NatsConfig;
use messaging::{retry_when, ErrorCategory, QueueError, RetryConfig};
use tracing::{debug, info, warn};

/// Open one connection, authenticating with the configured JWT and NKey seed
/// when present.
pub async fn connect(config: &NatsConfig) -> Result<Client, QueueError> {
    let options = match config.credentials() {
        Some(creds) => ConnectOptions::with_credentials(&creds)
            .map_err(|e| QueueError::Config(format!("invalid NATS credentials: {}", e)))?,
        None => ConnectOptions::new(),
    };

    let client = options
        .name(&config.connection_name)
        .event_callback(|event| async move {
            match event {
                Event::Disconnected => warn!("Disconnected from NATS"),
                Event::Connected => info!("Reconnected to NATS"),
                other => debug!(event = %other, "NATS connection event"),
            }
        })
        .connect(config.url.as_str())
        .await
        .map_err(|e| QueueError::Connection(e.to_string()))?;

    info!(
        url = %config.url,
        name = %config.connection_name,
        authenticated = config.credentials().is_some(),
        "Connected to NATS"
    );
    Ok(client)
}

/// [`connect`] with bounded backoff. Credential errors are not retried.
pub async fn connect_with_retry(
    config: &NatsConfig,
    retry: RetryConfig,
) -> Result<Client, QueueError> {
    retry_when(
        || connect(config),
        retry,
        |e| e.category() == ErrorCategory::Transient,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_credentials_are_not_retried() {
        let config = NatsConfig::new("nats://127.0.0.1:1")
            .with_credentials("not-a-jwt", "not-a-seed");

        let err = connect_with_retry(&config, RetryConfig::new().with_initial_delay(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = NatsConfig::new("nats://127.0.0.1:1");

        let err = connect_with_retry(
            &config,
            RetryConfig::new()
                .with_max_retries(1)
                .with_initial_delay(1)
                .without_jitter(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QueueError::Connection(_)), "got {err:?}");
    }
}
