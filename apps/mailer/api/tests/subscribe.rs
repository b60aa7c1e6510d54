//! `/api/subscribe` against the in-memory broker.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use email::{Email, SmtpStream, SmtpSubject};
use http_body_util::BodyExt;
use mailer_api::handlers::router;
use messaging::{
    Envelope, InMemoryBroker, Producer, PublishMode, StreamSpec, SubjectMode, SubjectNamespace,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const STREAM: &str = "SMTP";

async fn app(broker: &InMemoryBroker) -> Router {
    let producer = Producer::new(
        broker.clone(),
        SubjectNamespace::<SmtpSubject>::new(SubjectMode::Debug),
        &StreamSpec::from_stream::<SmtpStream>(),
    )
    .await
    .unwrap()
    .with_mode(PublishMode::Acknowledged);
    router(producer)
}

async fn post(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/subscribe")
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn email_body(address: &str, subject: &str, first_name: &str) -> String {
    json!({
        "subject": subject,
        "message": "Hello World",
        "recipient": [{ "address": address, "firstName": first_name }]
    })
    .to_string()
}

#[tokio::test]
async fn test_valid_email_is_queued() {
    let broker = InMemoryBroker::new();
    let (status, body) = post(
        app(&broker).await,
        email_body("kristopherab@gmail.com", "Test", "Kristopher"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Email sent" }));

    assert_eq!(
        broker.retained_subjects(STREAM).await,
        vec!["debug.smtp.subscribe".to_string()]
    );
    let payloads = broker.retained_payloads(STREAM).await;
    let queued = Email::decode(&payloads[0]).unwrap();
    assert_eq!(queued.subject, "Test");
}

#[tokio::test]
async fn test_malformed_address_is_rejected() {
    let broker = InMemoryBroker::new();
    let (status, body) = post(
        app(&broker).await,
        email_body("test#gmail.com", "Test", "Kristopher"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_JSON");
    assert_eq!(body["code"], 1010);
    assert!(body["message"].as_str().unwrap().contains("test#gmail.com"));
    assert!(broker.retained_payloads(STREAM).await.is_empty());
}

#[tokio::test]
async fn test_length_rules_are_reported() {
    let broker = InMemoryBroker::new();
    let cases = [
        (email_body("a@example.com", &"x".repeat(51), "Ada"), "subject"),
        (email_body("a@example.com", "Test", ""), "firstName"),
        (
            json!({
                "subject": "Test",
                "message": "x".repeat(256),
                "recipient": [{ "address": "a@example.com", "firstName": "Ada" }]
            })
            .to_string(),
            "message",
        ),
        (
            json!({
                "subject": "Test",
                "message": "m",
                "recipient": [{ "address": "a@example.com", "firstName": "Ada", "lastName": "x".repeat(51) }]
            })
            .to_string(),
            "lastName",
        ),
        (
            json!({ "subject": "Test", "message": "m", "recipient": [] }).to_string(),
            "recipient",
        ),
    ];

    for (body, field) in cases {
        let (status, response) = post(app(&broker).await, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{field}");
        assert_eq!(response["error"], "VALIDATION_ERROR", "{field}");
        assert_eq!(response["code"], 1001);
        assert!(
            response["message"].as_str().unwrap().contains(field),
            "{field}: {}",
            response["message"]
        );
        assert!(response["details"].is_object());
    }

    assert!(broker.retained_payloads(STREAM).await.is_empty());
}

#[tokio::test]
async fn test_publish_failure_is_500() {
    let broker = InMemoryBroker::new();
    // The stream does not capture the subscribe subject
    let producer = Producer::new(
        broker.clone(),
        SubjectNamespace::<SmtpSubject>::new(SubjectMode::Debug),
        &StreamSpec::new("OTHER", vec!["other.>".into()]),
    )
    .await
    .unwrap()
    .with_mode(PublishMode::Acknowledged);

    let (status, body) = post(
        router(producer),
        email_body("kristopherab@gmail.com", "Test", "Kristopher"),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "PUBLISH_FAILED");
}

#[tokio::test]
async fn test_openapi_and_health() {
    let broker = InMemoryBroker::new();

    let response = app(&broker)
        .await
        .oneshot(Request::builder().uri("/api/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(doc["paths"]["/api/subscribe"]["post"].is_object());
    assert!(doc["components"]["schemas"]["Email"].is_object());

    let response = app(&broker)
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
