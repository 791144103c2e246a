use anyhow::{Context, Result};
use models_comms::message::MessageUpdate;

/// Applies one update command to a stored message. The command carries the
/// already-merged metadata and the already-resolved status, so this is a
/// plain column write; all precedence logic lives in the dedup layer.
#[tracing::instrument(skip(executor, update), fields(message_id = %update.id))]
pub async fn apply_message_update<'e, E>(executor: E, update: &MessageUpdate) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_messages
        SET external_message_id = COALESCE($1, external_message_id),
            status = COALESCE($2, status),
            sender_participant_id = COALESCE(sender_participant_id, $3),
            contact_record_id = COALESCE(contact_record_id, $4),
            sent_at = COALESCE($5, sent_at),
            metadata = COALESCE($6, metadata),
            updated_at = NOW()
        WHERE id = $7
        "#,
    )
    .bind(update.external_message_id.as_deref())
    .bind(update.status.map(|s| s.to_string()))
    .bind(update.sender_participant_id)
    .bind(update.contact_record_id)
    .bind(update.sent_at)
    .bind(update.metadata.as_ref())
    .bind(update.id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to apply update to message {}", update.id))?;

    Ok(())
}
