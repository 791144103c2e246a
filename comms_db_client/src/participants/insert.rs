use anyhow::{Context, Result};
use models_comms::participant::Participant;
use sqlx::{PgPool, QueryBuilder};

/// Postgres caps bind parameters at 65535; 500 rows of participant columns
/// stays well under it.
const INSERT_BATCH_SIZE: usize = 500;

/// Batch-creates participants with conflict-ignore semantics, so concurrent
/// webhook deliveries racing a sync run simply lose the insert and find the
/// winner's row on their next read. Rows are sorted by their first
/// identifier to keep insert order consistent and avoid deadlocks between
/// overlapping batches.
#[tracing::instrument(skip_all, fields(count = participants.len()))]
pub async fn insert_participants(pool: &PgPool, participants: &[Participant]) -> Result<()> {
    if participants.is_empty() {
        return Ok(());
    }

    let mut ordered: Vec<&Participant> = participants.iter().collect();
    ordered.sort_by(|a, b| {
        let key = |p: &Participant| {
            (
                p.email.clone(),
                p.phone.clone(),
                p.linkedin_member_urn.clone(),
            )
        };
        key(a).cmp(&key(b))
    });

    for chunk in ordered.chunks(INSERT_BATCH_SIZE) {
        let mut builder = QueryBuilder::new(
            r#"
            INSERT INTO comms_participants (
                id, email, phone, linkedin_member_urn, instagram_username,
                facebook_id, telegram_id, twitter_handle, name, metadata,
                first_seen, last_seen, created_at, updated_at
            )
            "#,
        );

        builder.push_values(chunk, |mut row, participant| {
            row.push_bind(participant.id)
                .push_bind(&participant.email)
                .push_bind(&participant.phone)
                .push_bind(&participant.linkedin_member_urn)
                .push_bind(&participant.instagram_username)
                .push_bind(&participant.facebook_id)
                .push_bind(&participant.telegram_id)
                .push_bind(&participant.twitter_handle)
                .push_bind(&participant.name)
                .push_bind(&participant.metadata)
                .push_bind(participant.first_seen)
                .push_bind(participant.last_seen)
                .push_bind(participant.created_at)
                .push_bind(participant.updated_at);
        });

        builder.push(" ON CONFLICT DO NOTHING");

        builder
            .build()
            .execute(pool)
            .await
            .context("Failed to batch insert participants")?;
    }

    Ok(())
}
