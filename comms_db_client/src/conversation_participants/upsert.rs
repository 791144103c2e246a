use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use models_comms::message::ParticipantRole;
use uuid::Uuid;

#[derive(Debug)]
pub struct UpsertMembershipOptions<'a> {
    pub conversation_id: Uuid,
    pub participant_id: Uuid,
    pub role: ParticipantRole,
    pub provider_participant_id: &'a str,
    /// True when the participant is the sender of the message being
    /// processed; bumps their per-conversation message count.
    pub sent_message: bool,
    pub message_at: Option<DateTime<Utc>>,
}

/// Creates or refreshes a participant's membership row. The role only ever
/// narrows to a more specific one (sender > recipient > cc > bcc > member,
/// resolved via array_position so the comparison happens in the conflict
/// arm and stays race-safe), and a returning participant is re-activated.
/// Returns whether the row was newly created (`xmax = 0` on the returned
/// tuple), which feeds the participant's conversation counter.
#[tracing::instrument(skip(executor, options), fields(conversation_id = %options.conversation_id))]
pub async fn upsert_membership<'e, 'a, E>(
    executor: E,
    options: UpsertMembershipOptions<'a>,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let inserted: (bool,) = sqlx::query_as(
        r#"
        INSERT INTO comms_conversation_participants (
            conversation_id, participant_id, role, is_active, message_count,
            last_message_at, unread_count, provider_participant_id
        )
        VALUES ($1, $2, $3, TRUE, CASE WHEN $4 THEN 1 ELSE 0 END, $5, 0, $6)
        ON CONFLICT (conversation_id, participant_id) DO UPDATE SET
            role = CASE
                WHEN array_position(
                        ARRAY['sender', 'recipient', 'cc', 'bcc', 'member'],
                        EXCLUDED.role
                     ) < array_position(
                        ARRAY['sender', 'recipient', 'cc', 'bcc', 'member'],
                        comms_conversation_participants.role
                     )
                THEN EXCLUDED.role
                ELSE comms_conversation_participants.role
            END,
            is_active = TRUE,
            left_at = NULL,
            message_count = comms_conversation_participants.message_count
                + CASE WHEN $4 THEN 1 ELSE 0 END,
            last_message_at = GREATEST(
                COALESCE(comms_conversation_participants.last_message_at, EXCLUDED.last_message_at),
                EXCLUDED.last_message_at
            ),
            provider_participant_id = CASE
                WHEN comms_conversation_participants.provider_participant_id = ''
                THEN EXCLUDED.provider_participant_id
                ELSE comms_conversation_participants.provider_participant_id
            END
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(options.conversation_id)
    .bind(options.participant_id)
    .bind(options.role.to_string())
    .bind(options.sent_message)
    .bind(options.message_at)
    .bind(options.provider_participant_id)
    .fetch_one(executor)
    .await
    .context("Failed to upsert conversation membership")?;

    Ok(inserted.0)
}

/// Marks a membership inactive when a participant leaves. The row is kept;
/// history stays attributable.
pub async fn mark_left<'e, E>(
    executor: E,
    conversation_id: Uuid,
    participant_id: Uuid,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        UPDATE comms_conversation_participants
        SET is_active = FALSE, left_at = NOW()
        WHERE conversation_id = $1 AND participant_id = $2
        "#,
    )
    .bind(conversation_id)
    .bind(participant_id)
    .execute(executor)
    .await
    .context("Failed to mark participant as left")?;

    Ok(())
}

/// Memberships for a conversation, used by tests and the reconcile utility.
pub async fn fetch_memberships<'e, E>(
    executor: E,
    conversation_id: Uuid,
) -> Result<Vec<models_comms::message::ConversationParticipant>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let rows = sqlx::query_as::<_, crate::parse::ConversationParticipantRow>(
        r#"
        SELECT conversation_id, participant_id, role, is_active, message_count,
               last_message_at, last_read_at, unread_count,
               provider_participant_id, left_at
        FROM comms_conversation_participants
        WHERE conversation_id = $1
        "#,
    )
    .bind(conversation_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("Failed to fetch memberships for conversation {conversation_id}"))?;

    rows.into_iter().map(TryFrom::try_from).collect()
}
