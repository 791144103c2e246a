use crate::parse::MessageRow;
use anyhow::{Context, Result};
use models_comms::message::Message;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = r#"
    id, channel_id, conversation_id, external_message_id, direction, content,
    subject, contact_email, contact_phone, sender_participant_id,
    contact_record_id, status, sent_at, received_at, created_at, updated_at,
    metadata
"#;

pub async fn fetch_by_id<'e, E>(executor: E, message_id: Uuid) -> Result<Option<Message>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM comms_messages
        WHERE id = $1
        "#
    );

    let row = sqlx::query_as::<_, MessageRow>(&query)
        .bind(message_id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("Failed to fetch message {message_id}"))?;

    row.map(Message::try_from).transpose()
}

/// Highest-priority dedup lookup: the client-side tracking id attached to
/// outbound sends before any provider confirmation exists. Scoped to the
/// channel because the confirming webhook may carry a different external id
/// format than the provisional row.
pub async fn fetch_by_tracking_id<'e, E>(
    executor: E,
    channel_id: Uuid,
    tracking_id: &str,
) -> Result<Option<Message>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM comms_messages
        WHERE channel_id = $1 AND metadata ->> 'tracking_id' = $2
        LIMIT 1
        "#
    );

    let row = sqlx::query_as::<_, MessageRow>(&query)
        .bind(channel_id)
        .bind(tracking_id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("Failed to fetch message by tracking id '{tracking_id}'"))?;

    row.map(Message::try_from).transpose()
}

/// Exact external-id dedup lookup within a conversation.
pub async fn fetch_by_external_id<'e, E>(
    executor: E,
    conversation_id: Uuid,
    external_message_id: &str,
) -> Result<Option<Message>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM comms_messages
        WHERE conversation_id = $1 AND external_message_id = $2
        LIMIT 1
        "#
    );

    let row = sqlx::query_as::<_, MessageRow>(&query)
        .bind(conversation_id)
        .bind(external_message_id)
        .fetch_optional(executor)
        .await
        .with_context(|| {
            format!("Failed to fetch message by external id '{external_message_id}'")
        })?;

    row.map(Message::try_from).transpose()
}

/// One up-front existence check for a whole sync batch. Returns the subset
/// of the passed external ids that already have rows, mapped to their
/// message ids, so the caller can partition into create/update lists.
#[tracing::instrument(skip(pool, external_ids), fields(count = external_ids.len()))]
pub async fn find_existing_external_ids(
    pool: &PgPool,
    conversation_id: Uuid,
    external_ids: &HashSet<String>,
) -> Result<HashMap<String, Uuid>> {
    if external_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<String> = external_ids.iter().cloned().collect();

    let rows: Vec<(String, Uuid)> = sqlx::query_as(
        r#"
        SELECT external_message_id, id
        FROM comms_messages
        WHERE conversation_id = $1 AND external_message_id = ANY($2)
        "#,
    )
    .bind(conversation_id)
    .bind(&ids)
    .fetch_all(pool)
    .await
    .with_context(|| {
        format!("Failed to check existing messages for conversation {conversation_id}")
    })?;

    Ok(rows.into_iter().collect())
}

/// A conversation's messages in display order: provider event time first,
/// ingestion time as the last resort. Raw insertion order is meaningless
/// once historical syncs backfill old messages after newer webhooks.
pub async fn fetch_conversation_messages<'e, E>(
    executor: E,
    conversation_id: Uuid,
) -> Result<Vec<Message>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM comms_messages
        WHERE conversation_id = $1
        ORDER BY COALESCE(sent_at, received_at, created_at) ASC
        "#
    );

    let rows = sqlx::query_as::<_, MessageRow>(&query)
        .bind(conversation_id)
        .fetch_all(executor)
        .await
        .with_context(|| format!("Failed to fetch messages for conversation {conversation_id}"))?;

    rows.into_iter().map(Message::try_from).collect()
}
