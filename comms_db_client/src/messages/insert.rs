use anyhow::{Context, Result};
use models_comms::message::Message;
use sqlx::QueryBuilder;

/// Bulk inserts are chunked so a historical sync of thousands of messages
/// never builds one oversized statement.
const INSERT_BATCH_SIZE: usize = 500;

fn push_message_values<'a>(builder: &mut QueryBuilder<'a, sqlx::Postgres>, messages: &'a [Message]) {
    builder.push_values(messages, |mut row, message| {
        row.push_bind(message.id)
            .push_bind(message.channel_id)
            .push_bind(message.conversation_id)
            .push_bind(&message.external_message_id)
            .push_bind(message.direction.to_string())
            .push_bind(&message.content)
            .push_bind(&message.subject)
            .push_bind(&message.contact_email)
            .push_bind(&message.contact_phone)
            .push_bind(message.sender_participant_id)
            .push_bind(message.contact_record_id)
            .push_bind(message.status.to_string())
            .push_bind(message.sent_at)
            .push_bind(message.received_at)
            .push_bind(message.created_at)
            .push_bind(message.updated_at)
            .push_bind(&message.metadata);
    });
}

const INSERT_PREFIX: &str = r#"
    INSERT INTO comms_messages (
        id, channel_id, conversation_id, external_message_id, direction,
        content, subject, contact_email, contact_phone,
        sender_participant_id, contact_record_id, status, sent_at,
        received_at, created_at, updated_at, metadata
    )
"#;

/// Inserts one message with conflict-ignore semantics. Returns whether a
/// row was actually written; a concurrent webhook winning the
/// (conversation, external_message_id) race leaves this a no-op and the
/// caller falls through to the update path.
pub async fn insert_message<'e, E>(executor: E, message: &Message) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let mut builder = QueryBuilder::new(INSERT_PREFIX);
    push_message_values(&mut builder, std::slice::from_ref(message));
    builder.push(" ON CONFLICT DO NOTHING");

    let result = builder
        .build()
        .execute(executor)
        .await
        .with_context(|| {
            format!(
                "Failed to insert message with external id '{}'",
                message.external_message_id
            )
        })?;

    Ok(result.rows_affected() == 1)
}

/// Bulk insert for the batch sync path, batched and conflict-ignoring to
/// tolerate concurrent webhook races. Takes a connection so the whole
/// batch can share one transaction with its membership and link writes.
#[tracing::instrument(skip_all, fields(count = messages.len()))]
pub async fn bulk_insert_messages(
    conn: &mut sqlx::PgConnection,
    messages: &[Message],
) -> Result<usize> {
    if messages.is_empty() {
        return Ok(0);
    }

    let mut inserted = 0usize;
    for chunk in messages.chunks(INSERT_BATCH_SIZE) {
        let mut builder = QueryBuilder::new(INSERT_PREFIX);
        push_message_values(&mut builder, chunk);
        builder.push(" ON CONFLICT DO NOTHING");

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .context("Failed to bulk insert messages")?;
        inserted += result.rows_affected() as usize;
    }

    Ok(inserted)
}
