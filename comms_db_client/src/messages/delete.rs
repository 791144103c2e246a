use anyhow::{Context, Result};
use uuid::Uuid;

/// Deletes a message row. Callers recompute conversation/channel aggregates
/// afterwards; nothing here decrements counters.
pub async fn delete_message<'e, E>(executor: E, message_id: Uuid) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM comms_messages
        WHERE id = $1
        "#,
    )
    .bind(message_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to delete message {message_id}"))?;

    Ok(result.rows_affected() == 1)
}
