use crate::parse::ConversationRow;
use anyhow::{Context, Result};
use models_comms::conversation::Conversation;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = r#"
    id, channel_id, external_thread_id, subject, status, priority,
    conversation_type, message_count, participant_count, last_message_at,
    primary_record_id, metadata, created_at, updated_at
"#;

pub async fn fetch_by_id<'e, E>(executor: E, conversation_id: Uuid) -> Result<Option<Conversation>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM comms_conversations
        WHERE id = $1
        "#
    );

    let row = sqlx::query_as::<_, ConversationRow>(&query)
        .bind(conversation_id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("Failed to fetch conversation {conversation_id}"))?;

    row.map(Conversation::try_from).transpose()
}

/// Thread-key lookup: the uniqueness boundary that stops duplicate-thread
/// creation races.
pub async fn fetch_by_thread_key<'e, E>(
    executor: E,
    channel_id: Uuid,
    external_thread_id: &str,
) -> Result<Option<Conversation>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM comms_conversations
        WHERE channel_id = $1 AND external_thread_id = $2
        "#
    );

    let row = sqlx::query_as::<_, ConversationRow>(&query)
        .bind(channel_id)
        .bind(external_thread_id)
        .fetch_optional(executor)
        .await
        .with_context(|| {
            format!("Failed to fetch conversation for thread '{external_thread_id}'")
        })?;

    row.map(Conversation::try_from).transpose()
}
