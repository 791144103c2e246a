use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Bumps a record's communication profile. `new_conversation` is true only
/// when the caller just created the first link for this (record,
/// conversation) pair; `messages_delta` counts the message events in the
/// batch, and `last_message_at` moves on every event regardless.
#[tracing::instrument(skip(executor), level = "debug")]
pub async fn bump_profile<'e, E>(
    executor: E,
    record_id: Uuid,
    new_conversation: bool,
    messages_delta: i64,
    message_at: Option<DateTime<Utc>>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO comms_record_profiles (
            record_id, total_conversations, total_messages, last_message_at, updated_at
        )
        VALUES ($1, CASE WHEN $2 THEN 1 ELSE 0 END, $4, $3, NOW())
        ON CONFLICT (record_id) DO UPDATE SET
            total_conversations = comms_record_profiles.total_conversations
                + CASE WHEN $2 THEN 1 ELSE 0 END,
            total_messages = comms_record_profiles.total_messages + $4,
            last_message_at = GREATEST(
                COALESCE(comms_record_profiles.last_message_at, EXCLUDED.last_message_at),
                EXCLUDED.last_message_at
            ),
            updated_at = NOW()
        "#,
    )
    .bind(record_id)
    .bind(new_conversation)
    .bind(message_at)
    .bind(messages_delta)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to bump communication profile for record {record_id}"))?;

    Ok(())
}

/// Fetches a profile, used by tests and the timeline header endpoint.
pub async fn fetch_profile<'e, E>(
    executor: E,
    record_id: Uuid,
) -> Result<Option<models_comms::links::RecordCommunicationProfile>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query_as::<_, crate::parse::RecordProfileRow>(
        r#"
        SELECT record_id, total_conversations, total_messages, last_message_at, updated_at
        FROM comms_record_profiles
        WHERE record_id = $1
        "#,
    )
    .bind(record_id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("Failed to fetch communication profile for record {record_id}"))?;

    Ok(row.map(Into::into))
}
