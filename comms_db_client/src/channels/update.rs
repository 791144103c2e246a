use anyhow::{Context, Result};
use uuid::Uuid;

/// Recomputes a channel's cached aggregates from its message set. Always
/// derived by re-query so concurrent writers and deletions can't drift the
/// counters.
#[tracing::instrument(skip(executor), level = "debug")]
pub async fn recompute_channel_aggregates<'e, E>(executor: E, channel_id: Uuid) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_channels c
        SET message_count = stats.message_count,
            last_message_at = stats.last_message_at,
            updated_at = NOW()
        FROM (
            SELECT COUNT(*) AS message_count,
                   MAX(COALESCE(sent_at, received_at, created_at)) AS last_message_at
            FROM comms_messages
            WHERE channel_id = $1
        ) stats
        WHERE c.id = $1
        "#,
    )
    .bind(channel_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to recompute aggregates for channel {channel_id}"))?;

    Ok(())
}
