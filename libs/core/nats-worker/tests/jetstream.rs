//! JetStream integration tests against a throwaway NATS container.

use core_config::NatsConfig;
use messaging::{
    Broker, ConsumerSpec, Delivery, Json, NoOpProcessor, PublishMode, QueueError, Raw,
    StreamSpec, Subscription, Worker, WorkerConfig,
};
use nats_worker::{connect, JetStreamBroker};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use test_utils::TestNats;
use tokio::sync::watch;

async fn broker(nats: &TestNats) -> JetStreamBroker {
    let config =
        NatsConfig::new(nats.connection_string()).with_connection_name("nats-worker-tests");
    JetStreamBroker::new(connect(&config).await.unwrap())
}

fn orders() -> StreamSpec {
    StreamSpec::new("ORDERS", vec!["orders.>".into()])
}

#[tokio::test]
async fn test_provisioning_is_idempotent() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;

    let first = broker.ensure_stream(&orders()).await.unwrap();
    let second = broker.ensure_stream(&orders()).await.unwrap();
    assert_eq!(first, second);

    let spec = ConsumerSpec::new("orders", "orders.created");
    let sub_a = broker.ensure_consumer(&first, &spec).await.unwrap();
    let sub_b = broker.ensure_consumer(&second, &spec).await.unwrap();

    let info = broker.stream_info("ORDERS").await.unwrap();
    assert_eq!(info.consumers, 1);
    assert_eq!(info.subjects, vec!["orders.>".to_string()]);

    sub_a.close().await.unwrap();
    sub_b.close().await.unwrap();
}

#[tokio::test]
async fn test_existing_durable_rejects_other_filter() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    let handle = broker
        .ensure_stream(&StreamSpec::new("SMTP", vec!["*.smtp.>".into()]))
        .await
        .unwrap();

    let production = broker
        .ensure_consumer(&handle, &ConsumerSpec::new("smtp", "internal.smtp.>"))
        .await
        .unwrap();
    let err = broker
        .ensure_consumer(&handle, &ConsumerSpec::new("smtp", "debug.smtp.>"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, QueueError::Provision { .. }), "got {err:?}");

    production.close().await.unwrap();
}

#[tokio::test]
async fn test_debug_and_production_durables_are_isolated() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    let handle = broker
        .ensure_stream(&StreamSpec::new("SMTP", vec!["*.smtp.>".into()]))
        .await
        .unwrap();

    let mut production = broker
        .ensure_consumer(&handle, &ConsumerSpec::new("smtp", "internal.smtp.>"))
        .await
        .unwrap();
    let mut debug = broker
        .ensure_consumer(&handle, &ConsumerSpec::new("smtp-debug", "debug.smtp.>"))
        .await
        .unwrap();

    broker
        .publish("internal.smtp.subscribe", b"prod".to_vec(), PublishMode::Acknowledged)
        .await
        .unwrap();

    assert!(tokio::time::timeout(Duration::from_millis(500), debug.next())
        .await
        .is_err());
    let delivery = tokio::time::timeout(Duration::from_secs(5), production.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.subject(), "internal.smtp.subscribe");
    delivery.ack().await.unwrap();

    production.close().await.unwrap();
    debug.close().await.unwrap();
}

#[tokio::test]
async fn test_overlapping_stream_is_rejected() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;

    broker.ensure_stream(&orders()).await.unwrap();
    let err = broker
        .ensure_stream(&StreamSpec::new("ORDERS_COPY", vec!["orders.created".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Provision { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_acknowledged_publish_reports_sequence() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    broker.ensure_stream(&orders()).await.unwrap();

    let receipt = broker
        .publish("orders.created", b"one".to_vec(), PublishMode::Acknowledged)
        .await
        .unwrap();
    assert_eq!(receipt.stream.as_deref(), Some("ORDERS"));
    assert_eq!(receipt.sequence, Some(1));

    let err = broker
        .publish("nowhere.created", b"lost".to_vec(), PublishMode::Acknowledged)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Publish { .. }), "got {err:?}");
}

async fn drain(
    worker: &mut Worker<JetStreamBroker, Raw>,
    mut rx: watch::Receiver<bool>,
) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(raw) = worker.next_msg_within(&mut rx, Duration::from_secs(2)).await {
        seen.push(raw.to_text());
    }
    seen
}

#[tokio::test]
async fn test_queue_group_delivers_each_message_once() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    let stream = orders();
    let consumer = ConsumerSpec::new("orders", "orders.created").with_max_ack_pending(10);

    let mut a: Worker<_, Raw> =
        Worker::new(broker.clone(), &stream, consumer.clone(), WorkerConfig::default())
            .await
            .unwrap();
    let mut b: Worker<_, Raw> =
        Worker::new(broker.clone(), &stream, consumer, WorkerConfig::default())
            .await
            .unwrap();

    for i in 0..20 {
        broker
            .publish(
                "orders.created",
                format!("order {}", i).into_bytes(),
                PublishMode::Acknowledged,
            )
            .await
            .unwrap();
    }

    let (_tx, rx) = watch::channel(false);
    let (seen_a, seen_b) = tokio::join!(drain(&mut a, rx.clone()), drain(&mut b, rx));

    let all: HashSet<String> = seen_a.iter().chain(seen_b.iter()).cloned().collect();
    assert_eq!(seen_a.len() + seen_b.len(), 20);
    assert_eq!(all.len(), 20);

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn test_unacked_message_is_redelivered() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    let handle = broker.ensure_stream(&orders()).await.unwrap();
    let spec = ConsumerSpec::new("orders", "orders.created").with_ack_wait(Duration::from_secs(1));
    let mut sub = broker.ensure_consumer(&handle, &spec).await.unwrap();

    broker
        .publish("orders.created", b"pay".to_vec(), PublishMode::Acknowledged)
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.delivered(), 1);
    let sequence = first.sequence();
    drop(first);

    let second = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.sequence(), sequence);
    assert_eq!(second.delivered(), 2);
    assert_eq!(second.payload(), b"pay");
    second.ack().await.unwrap();

    sub.close().await.unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u32,
    item: String,
}

#[tokio::test]
async fn test_json_payload_reaches_worker() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    let stream = orders();
    let mut worker: Worker<_, Json<Order>> = Worker::new(
        broker.clone(),
        &stream,
        ConsumerSpec::new("orders", "orders.created"),
        WorkerConfig::default(),
    )
    .await
    .unwrap();

    let order = Order {
        id: 7,
        item: "keyboard".into(),
    };
    broker
        .publish(
            "orders.created",
            serde_json::to_vec(&order).unwrap(),
            PublishMode::Buffered,
        )
        .await
        .unwrap();

    let (_tx, mut rx) = watch::channel(false);
    let received = worker
        .next_msg_within(&mut rx, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(received.into_inner(), order);

    worker.close().await.unwrap();
}

#[tokio::test]
async fn test_cancel_then_close_keeps_later_messages() {
    let nats = TestNats::new().await;
    let broker = broker(&nats).await;
    let stream = orders();
    let consumer = ConsumerSpec::new("orders", "orders.created");

    let mut worker: Worker<_, Raw> = Worker::new(
        broker.clone(),
        &stream,
        consumer.clone(),
        WorkerConfig::default(),
    )
    .await
    .unwrap();

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });

    let result = tokio::time::timeout(Duration::from_secs(5), worker.listen(rx, &NoOpProcessor))
        .await
        .unwrap();
    assert!(matches!(result, Err(QueueError::Cancelled)));
    worker.close().await.unwrap();

    broker
        .publish("orders.created", b"late".to_vec(), PublishMode::Acknowledged)
        .await
        .unwrap();
    assert_eq!(broker.stream_info("ORDERS").await.unwrap().messages, 1);

    let mut next: Worker<_, Raw> =
        Worker::new(broker.clone(), &stream, consumer, WorkerConfig::default())
            .await
            .unwrap();
    let (_tx, mut rx) = watch::channel(false);
    let raw = next
        .next_msg_within(&mut rx, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(raw.to_text(), "late");

    next.close().await.unwrap();
    broker.shutdown().await.unwrap();
}
