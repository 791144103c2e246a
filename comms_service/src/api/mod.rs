pub mod context;
pub mod health;
pub mod sync;
pub mod webhook;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use context::ApiContext;
use models_comms::pubsub::{FailureReason, ProcessingError};
use std::sync::Arc;

pub fn router(ctx: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/webhooks/{channel_type}/{account_id}",
            post(webhook::ingest_webhook),
        )
        .route("/conversations/{conversation_id}/sync", post(sync::sync))
        .with_state(ctx)
}

/// Maps pipeline errors onto HTTP statuses. Webhook callers always get a
/// definitive response; retryable failures surface as 503 so the provider
/// redelivers.
pub struct ApiError(pub ProcessingError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self.0 {
            ProcessingError::NonRetryable(detail) => match detail.reason {
                FailureReason::ChannelNotFound | FailureReason::ConversationNotFound => {
                    (StatusCode::NOT_FOUND, detail.reason)
                }
                _ => (StatusCode::UNPROCESSABLE_ENTITY, detail.reason),
            },
            ProcessingError::Retryable(detail) => {
                (StatusCode::SERVICE_UNAVAILABLE, detail.reason)
            }
        };

        tracing::error!(error = ?self.0, %status, "Request failed");
        (status, reason.to_string()).into_response()
    }
}

impl From<ProcessingError> for ApiError {
    fn from(error: ProcessingError) -> ApiError {
        ApiError(error)
    }
}
