use anyhow::{Context, Result};
use models_comms::links::RecordCommunicationLink;

/// Idempotent link creation keyed on (record, conversation, participant).
/// Returns whether the link was newly created, which is what gates the
/// profile's conversation counter.
#[tracing::instrument(skip(executor, link), fields(record_id = %link.record_id))]
pub async fn ensure_link<'e, E>(executor: E, link: &RecordCommunicationLink) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO comms_record_links (
            id, record_id, conversation_id, participant_id, match_type,
            match_identifier, confidence_score, created_by_sync, is_primary,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        ON CONFLICT (record_id, conversation_id, participant_id) DO NOTHING
        "#,
    )
    .bind(link.id)
    .bind(link.record_id)
    .bind(link.conversation_id)
    .bind(link.participant_id)
    .bind(link.match_type.to_string())
    .bind(&link.match_identifier)
    .bind(link.confidence_score)
    .bind(link.created_by_sync)
    .bind(link.is_primary)
    .execute(executor)
    .await
    .context("Failed to upsert record communication link")?;

    Ok(result.rows_affected() == 1)
}

/// Counts the links between one record and one conversation across all
/// participants. A count of 1 right after an insert means that insert was
/// the first link for the pair.
pub async fn count_links_for_pair<'e, E>(
    executor: E,
    record_id: uuid::Uuid,
    conversation_id: uuid::Uuid,
) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM comms_record_links
        WHERE record_id = $1 AND conversation_id = $2
        "#,
    )
    .bind(record_id)
    .bind(conversation_id)
    .fetch_one(executor)
    .await
    .context("Failed to count record links for pair")?;

    Ok(count.0)
}
