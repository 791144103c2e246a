use crate::api::context::ApiContext;
use crate::api::ApiError;
use crate::ingest::sync::sync_conversation;
use axum::extract::{Path, State};
use axum::Json;
use models_comms::ingest::{SyncOptions, SyncSummary};
use std::sync::Arc;
use uuid::Uuid;

/// The batch sync entry point. Always answers with a summary; per-message
/// failures are counts inside it, never a failed request.
#[tracing::instrument(skip(ctx, options))]
pub async fn sync(
    State(ctx): State<Arc<ApiContext>>,
    Path(conversation_id): Path<Uuid>,
    Json(options): Json<SyncOptions>,
) -> Result<Json<SyncSummary>, ApiError> {
    let summary = sync_conversation(
        &ctx.repo,
        &ctx.records,
        &ctx.provider,
        &ctx.publisher,
        &ctx.policy,
        conversation_id,
        options,
    )
    .await?;

    Ok(Json(summary))
}
