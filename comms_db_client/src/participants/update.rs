use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persists an upgraded display name. The caller decides the upgrade via
/// the name-quality policy; this write is unconditional.
pub async fn update_name<'e, E>(executor: E, participant_id: Uuid, name: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_participants
        SET name = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(name)
    .bind(participant_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to update name for participant {participant_id}"))?;

    Ok(())
}

/// Fills in identifier namespaces a later message revealed. Existing values
/// are never overwritten; only empty columns gain the new identifier.
pub async fn backfill_identifiers<'e, E>(
    executor: E,
    participant_id: Uuid,
    email: &str,
    phone: &str,
    linkedin_member_urn: &str,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_participants
        SET email = CASE WHEN email = '' THEN $1 ELSE email END,
            phone = CASE WHEN phone = '' THEN $2 ELSE phone END,
            linkedin_member_urn = CASE
                WHEN linkedin_member_urn = '' THEN $3
                ELSE linkedin_member_urn
            END,
            updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(email)
    .bind(phone)
    .bind(linkedin_member_urn)
    .bind(participant_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to backfill identifiers for participant {participant_id}"))?;

    Ok(())
}

/// Persists a primary record link found during resolution.
#[tracing::instrument(skip(executor), level = "debug")]
pub async fn update_record_link<'e, E>(
    executor: E,
    participant_id: Uuid,
    record_id: Uuid,
    confidence: f64,
    method: &str,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_participants
        SET record_id = $1,
            resolution_confidence = $2,
            resolution_method = $3,
            resolved_at = NOW(),
            updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(record_id)
    .bind(confidence)
    .bind(method)
    .bind(participant_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to update record link for participant {participant_id}"))?;

    Ok(())
}

/// Persists a secondary (company) record link.
#[tracing::instrument(skip(executor), level = "debug")]
pub async fn update_secondary_record_link<'e, E>(
    executor: E,
    participant_id: Uuid,
    record_id: Uuid,
    confidence: f64,
    method: &str,
    pipeline: &str,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_participants
        SET secondary_record_id = $1,
            secondary_confidence = $2,
            secondary_resolution_method = $3,
            secondary_pipeline = $4,
            updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(record_id)
    .bind(confidence)
    .bind(method)
    .bind(pipeline)
    .bind(participant_id)
    .execute(executor)
    .await
    .with_context(|| {
        format!("Failed to update secondary record link for participant {participant_id}")
    })?;

    Ok(())
}

/// Manual unlink clears the record association but never destroys the
/// participant.
pub async fn clear_record_link<'e, E>(executor: E, participant_id: Uuid) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_participants
        SET record_id = NULL,
            resolution_confidence = 0,
            resolution_method = '',
            resolved_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(participant_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to clear record link for participant {participant_id}"))?;

    Ok(())
}

/// Refreshes activity stats as messages arrive.
pub async fn touch_activity<'e, E>(
    executor: E,
    participant_id: Uuid,
    seen_at: DateTime<Utc>,
    messages_delta: i64,
    conversations_delta: i64,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_participants
        SET last_seen = GREATEST(COALESCE(last_seen, $1), $1),
            first_seen = LEAST(COALESCE(first_seen, $1), $1),
            total_messages = total_messages + $2,
            total_conversations = total_conversations + $3,
            updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(seen_at)
    .bind(messages_delta)
    .bind(conversations_delta)
    .bind(participant_id)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to touch activity for participant {participant_id}"))?;

    Ok(())
}
