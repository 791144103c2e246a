use crate::api::context::ApiContext;
use crate::api::ApiError;
use crate::ingest::webhook::ingest_webhook_event;
use axum::extract::{Path, State};
use axum::Json;
use models_comms::channel::ChannelType;
use models_comms::ingest::IngestOutcome;
use models_comms::pubsub::{FailureReason, ProcessingError};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// The synchronous webhook entry point. The provider gets a definitive
/// stored/skipped/error answer within the request cycle.
#[tracing::instrument(skip(ctx, payload))]
pub async fn ingest_webhook(
    State(ctx): State<Arc<ApiContext>>,
    Path((channel_type, account_id)): Path<(String, String)>,
    Json(payload): Json<JsonValue>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let channel_type: ChannelType = channel_type.parse().map_err(|_| {
        ApiError(ProcessingError::non_retryable(
            FailureReason::ChannelNotFound,
            anyhow::anyhow!("Unknown channel type '{channel_type}'"),
        ))
    })?;

    let outcome = ingest_webhook_event(
        &ctx.repo,
        &ctx.records,
        &ctx.publisher,
        &ctx.policy,
        channel_type,
        &account_id,
        &payload,
    )
    .await?;

    Ok(Json(outcome))
}
