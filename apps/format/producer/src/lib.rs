//! Format producer
//!
//! Every `POST /publish` publishes `message <n>` to `format.foo`.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use core_config::{Environment, FromEnv, NatsConfig, ServerConfig};
use domain_format::{FormatProducer, FormatStream, FormatSubject};
use eyre::{Result, WrapErr};
use messaging::{
    retry_when, Broker, ErrorCategory, Producer, Raw, RetryConfig, StreamSpec, SubjectMode,
    SubjectNamespace,
};
use nats_worker::{connect_with_retry, shutdown_channel, wait_for_shutdown, JetStreamBroker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct AppState<B: Broker> {
    producer: FormatProducer<B>,
    count: AtomicU64,
}

pub fn router<B: Broker>(producer: FormatProducer<B>) -> Router {
    let state = Arc::new(AppState {
        producer,
        count: AtomicU64::new(0),
    });

    Router::new()
        .route("/publish", post(publish::<B>))
        .with_state(state)
}

async fn publish<B: Broker>(State(state): State<Arc<AppState<B>>>) -> impl IntoResponse {
    let n = state.count.fetch_add(1, Ordering::SeqCst) + 1;
    let message = format!("message {}", n);

    match state
        .producer
        .publish(FormatSubject::Foo, &Raw::from(message.as_str()))
        .await
    {
        Ok(_) => (StatusCode::OK, format!("published {}", message)),
        Err(e) => {
            error!(error = %e, "Publish failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let server = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let nats = NatsConfig::from_env()
        .wrap_err("Failed to load NATS configuration")?
        .with_connection_name("format-producer");
    info!(?environment, nats = ?nats, "Starting format producer");

    let client = connect_with_retry(&nats, RetryConfig::new())
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", nats.url))?;
    let broker = JetStreamBroker::new(client);

    let namespace = SubjectNamespace::<FormatSubject>::new(SubjectMode::from_debug(nats.debug));
    let stream = StreamSpec::from_stream::<FormatStream>();
    let producer = retry_when(
        || Producer::new(broker.clone(), namespace, &stream),
        RetryConfig::new(),
        |e| e.category() != ErrorCategory::Permanent,
    )
    .await
    .wrap_err("Failed to provision FORMAT stream")?;

    let listener = tokio::net::TcpListener::bind(server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind {}", server.address()))?;
    info!(addr = %server.address(), "Listening");

    let served = axum::serve(listener, router(producer).layer(TraceLayer::new_for_http()))
        .with_graceful_shutdown(wait_for_shutdown(shutdown_channel()))
        .await
        .wrap_err("HTTP server failed");

    broker.shutdown().await.wrap_err("Failed to flush NATS connection")?;
    info!("Format producer stopped");
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use messaging::InMemoryBroker;
    use tower::ServiceExt;

    async fn post(app: Router) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/publish")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_publish_counts_messages() {
        let broker = InMemoryBroker::new();
        let producer = Producer::new(
            broker.clone(),
            SubjectNamespace::new(SubjectMode::Production),
            &StreamSpec::from_stream::<FormatStream>(),
        )
        .await
        .unwrap();
        let app = router(producer);

        assert_eq!(post(app.clone()).await, (StatusCode::OK, "published message 1".into()));
        assert_eq!(post(app).await, (StatusCode::OK, "published message 2".into()));

        assert_eq!(
            broker.retained_payloads("FORMAT").await,
            vec![b"message 1".to_vec(), b"message 2".to_vec()]
        );
        assert_eq!(
            broker.retained_subjects("FORMAT").await,
            vec!["format.foo".to_string(), "format.foo".to_string()]
        );
    }

    #[tokio::test]
    async fn test_publish_failure_is_500() {
        let broker = InMemoryBroker::new();
        let producer = Producer::new(
            broker.clone(),
            SubjectNamespace::new(SubjectMode::Production),
            &StreamSpec::new("OTHER", vec!["other.>".into()]),
        )
        .await
        .unwrap();

        let (status, body) = post(router(producer)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("format.foo"));
    }
}
