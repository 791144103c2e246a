use crate::parse::ParticipantRow;
use anyhow::{Context, Result};
use models_comms::identifier::Identifier;
use models_comms::participant::Participant;
use sqlx::PgPool;
use uuid::Uuid;

const PARTICIPANT_COLUMNS: &str = r#"
    id, email, phone, linkedin_member_urn, instagram_username, facebook_id,
    telegram_id, twitter_handle, name, metadata, record_id,
    resolution_confidence, resolution_method, resolved_at,
    secondary_record_id, secondary_confidence, secondary_resolution_method,
    secondary_pipeline, total_conversations, total_messages, first_seen,
    last_seen, created_at, updated_at
"#;

/// One OR-combined batch fetch for every identifier collected from a sync
/// run. This is the query that keeps participant resolution at one database
/// round-trip per batch instead of one per message.
#[tracing::instrument(skip_all, fields(
    emails = emails.len(), phones = phones.len(),
    urns = linkedin_urns.len(), provider_ids = provider_ids.len()
))]
pub async fn fetch_by_identifiers(
    pool: &PgPool,
    emails: &[String],
    phones: &[String],
    linkedin_urns: &[String],
    provider_ids: &[String],
) -> Result<Vec<Participant>> {
    if emails.is_empty() && phones.is_empty() && linkedin_urns.is_empty() && provider_ids.is_empty()
    {
        return Ok(Vec::new());
    }

    let query = format!(
        r#"
        SELECT {PARTICIPANT_COLUMNS}
        FROM comms_participants
        WHERE email = ANY($1)
           OR phone = ANY($2)
           OR linkedin_member_urn = ANY($3)
           OR metadata ->> 'provider_id' = ANY($4)
        "#
    );

    let rows = sqlx::query_as::<_, ParticipantRow>(&query)
        .bind(emails)
        .bind(phones)
        .bind(linkedin_urns)
        .bind(provider_ids)
        .fetch_all(pool)
        .await
        .context("Failed to batch fetch participants by identifiers")?;

    Ok(rows.into_iter().map(Participant::from).collect())
}

/// Single-identifier lookup used by the webhook path, which resolves one
/// message at a time instead of building a batch cache.
pub async fn fetch_by_identifier<'e, E>(
    executor: E,
    identifier: &Identifier,
) -> Result<Option<Participant>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let clause = match identifier {
        Identifier::Email(_) => "email = $1",
        Identifier::Phone(_) => "phone = $1",
        Identifier::LinkedinUrn(_) => "linkedin_member_urn = $1",
        Identifier::ProviderId(_) => "metadata ->> 'provider_id' = $1",
    };

    let query = format!(
        r#"
        SELECT {PARTICIPANT_COLUMNS}
        FROM comms_participants
        WHERE {clause}
        LIMIT 1
        "#
    );

    let row = sqlx::query_as::<_, ParticipantRow>(&query)
        .bind(identifier.value())
        .fetch_optional(executor)
        .await
        .with_context(|| format!("Failed to fetch participant by {identifier}"))?;

    Ok(row.map(Participant::from))
}

pub async fn fetch_by_id<'e, E>(executor: E, participant_id: Uuid) -> Result<Option<Participant>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        SELECT {PARTICIPANT_COLUMNS}
        FROM comms_participants
        WHERE id = $1
        "#
    );

    let row = sqlx::query_as::<_, ParticipantRow>(&query)
        .bind(participant_id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("Failed to fetch participant {participant_id}"))?;

    Ok(row.map(Participant::from))
}
