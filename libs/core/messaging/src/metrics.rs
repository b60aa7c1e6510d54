//! Prometheus metrics for queue workers.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Per-consumer worker metrics.
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    stream: String,
    consumer: String,
}

impl QueueMetrics {
    pub fn new(stream: &str, consumer: &str) -> Self {
        Self {
            stream: stream.to_string(),
            consumer: consumer.to_string(),
        }
    }

    pub fn message_received(&self) {
        counter!(
            "queue_worker_messages_received_total",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone()
        )
        .increment(1);
    }

    pub fn message_processed(&self, duration: Duration) {
        counter!(
            "queue_worker_messages_processed_total",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone()
        )
        .increment(1);

        histogram!(
            "queue_worker_processing_duration_seconds",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn message_failed(&self, category: &str) {
        counter!(
            "queue_worker_messages_failed_total",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    pub fn message_retried(&self) {
        counter!(
            "queue_worker_messages_retried_total",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone()
        )
        .increment(1);
    }

    pub fn message_dead_lettered(&self) {
        counter!(
            "queue_worker_messages_dead_lettered_total",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone()
        )
        .increment(1);
    }

    pub fn ack_failed(&self) {
        counter!(
            "queue_worker_ack_failures_total",
            "stream" => self.stream.clone(),
            "consumer" => self.consumer.clone()
        )
        .increment(1);
    }
}

/// Install the global Prometheus recorder.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
