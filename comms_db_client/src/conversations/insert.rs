use crate::conversations::get::fetch_by_thread_key;
use anyhow::{Context, Result};
use models_comms::conversation::Conversation;
use sqlx::PgPool;

/// Idempotent conversation creation keyed on (channel, external_thread_id).
/// A racing creator loses the conflict-ignored insert and picks up the
/// winner's row on the re-read.
#[tracing::instrument(skip(pool, conversation), fields(channel_id = %conversation.channel_id))]
pub async fn get_or_create(pool: &PgPool, conversation: Conversation) -> Result<Conversation> {
    let result = sqlx::query(
        r#"
        INSERT INTO comms_conversations (
            id, channel_id, external_thread_id, subject, status, priority,
            conversation_type, message_count, participant_count,
            last_message_at, primary_record_id, metadata, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 0, NULL, $8, $9, NOW(), NOW())
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(conversation.id)
    .bind(conversation.channel_id)
    .bind(&conversation.external_thread_id)
    .bind(&conversation.subject)
    .bind(conversation.status.to_string())
    .bind(conversation.priority.to_string())
    .bind(conversation.conversation_type.to_string())
    .bind(conversation.primary_record_id)
    .bind(&conversation.metadata)
    .execute(pool)
    .await
    .context("Failed to insert conversation")?;

    if result.rows_affected() == 1 {
        return Ok(conversation);
    }

    // lost the race; the winner's row carries the canonical id
    fetch_by_thread_key(pool, conversation.channel_id, &conversation.external_thread_id)
        .await?
        .context("Conversation missing after conflict-ignored insert")
}
