use anyhow::{Context, Result};
use uuid::Uuid;

/// Recomputes a conversation's cached aggregates from its message and
/// participant sets. Counts are always derived by re-query, never
/// incremented, so they stay correct under concurrent writers, bulk
/// operations and deletions.
#[tracing::instrument(skip(executor), level = "debug")]
pub async fn recompute_aggregates<'e, E>(executor: E, conversation_id: Uuid) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_conversations c
        SET message_count = msg.message_count,
            last_message_at = msg.last_message_at,
            participant_count = prt.participant_count,
            conversation_type = CASE
                WHEN c.metadata ->> 'is_broadcast' = 'true' THEN 'broadcast'
                WHEN c.metadata ->> 'is_channel' = 'true' THEN 'channel'
                WHEN c.metadata ->> 'is_group' = 'true' OR prt.participant_count > 2 THEN 'group'
                ELSE 'direct'
            END,
            updated_at = NOW()
        FROM (
            SELECT COUNT(*) AS message_count,
                   MAX(COALESCE(sent_at, received_at, created_at)) AS last_message_at
            FROM comms_messages
            WHERE conversation_id = $1
        ) msg,
        (
            SELECT COUNT(*) AS participant_count
            FROM comms_conversation_participants
            WHERE conversation_id = $1 AND is_active
        ) prt
        WHERE c.id = $1
        "#,
    )
    .bind(conversation_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to recompute aggregates for conversation {conversation_id}"))?;

    Ok(())
}

/// Sets the conversation's denormalized primary record pointer if it has
/// none yet. An already-resolved pointer is never overwritten by a weaker
/// guess.
pub async fn set_primary_record_if_unset<'e, E>(
    executor: E,
    conversation_id: Uuid,
    record_id: Uuid,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_conversations
        SET primary_record_id = $1, updated_at = NOW()
        WHERE id = $2 AND primary_record_id IS NULL
        "#,
    )
    .bind(record_id)
    .bind(conversation_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to set primary record on conversation {conversation_id}"))?;

    Ok(())
}
