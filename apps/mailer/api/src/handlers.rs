use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use email::{Email, Recipient, SmtpSubject};
use messaging::{Broker, Producer};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{OpenApi, ToSchema};

use crate::error::{ApiError, ErrorResponse};

pub const TAG: &str = "smtp";

#[derive(OpenApi)]
#[openapi(
    paths(subscribe),
    components(schemas(Email, Recipient, SubscribeResponse, ErrorResponse)),
    tags((name = TAG, description = "Queue emails for delivery"))
)]
pub struct ApiDoc;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscribeResponse {
    #[schema(example = "Email sent")]
    pub message: String,
}

pub struct AppState<B: Broker> {
    pub producer: Producer<B, SmtpSubject>,
}

impl<B: Broker> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

/// `/api/subscribe`, `/api/openapi.json` and `/health`.
pub fn router<B: Broker>(producer: Producer<B, SmtpSubject>) -> Router {
    let api = Router::new()
        .route("/subscribe", post(subscribe::<B>))
        .route("/openapi.json", get(openapi))
        .with_state(AppState { producer });

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
}

/// Validate an email and queue it on the subscribe subject
#[utoipa::path(
    post,
    path = "/api/subscribe",
    tag = TAG,
    request_body = Email,
    responses(
        (status = 200, description = "Email queued", body = SubscribeResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 500, description = "Queue unavailable", body = ErrorResponse)
    )
)]
async fn subscribe<B: Broker>(
    State(state): State<AppState<B>>,
    body: Bytes,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let email = Email::from_slice(&body)?;
    let receipt = state.producer.publish(SmtpSubject::Subscribe, &email).await?;

    info!(
        subject = %receipt.subject,
        sequence = ?receipt.sequence,
        recipients = email.recipients.len(),
        "Email queued"
    );

    Ok(Json(SubscribeResponse {
        message: "Email sent".to_string(),
    }))
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
