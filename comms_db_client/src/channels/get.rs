use crate::parse::ChannelRow;
use anyhow::{Context, Result};
use models_comms::channel::{Channel, ChannelType};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn fetch_channel_by_id(pool: &PgPool, channel_id: Uuid) -> Result<Option<Channel>> {
    let row = sqlx::query_as::<_, ChannelRow>(
        r#"
        SELECT id, account_id, channel_type, name, is_sync_active, message_count,
               last_message_at, metadata, created_at, updated_at
        FROM comms_channels
        WHERE id = $1
        "#,
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to fetch channel {channel_id}"))?;

    row.map(Channel::try_from).transpose()
}

/// Looks up the channel for a provider account, which is how webhook
/// payloads address us.
pub async fn fetch_channel_by_account(
    pool: &PgPool,
    account_id: &str,
    channel_type: ChannelType,
) -> Result<Option<Channel>> {
    let row = sqlx::query_as::<_, ChannelRow>(
        r#"
        SELECT id, account_id, channel_type, name, is_sync_active, message_count,
               last_message_at, metadata, created_at, updated_at
        FROM comms_channels
        WHERE account_id = $1 AND channel_type = $2
        "#,
    )
    .bind(account_id)
    .bind(channel_type.to_string())
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to fetch channel for account {account_id}"))?;

    row.map(Channel::try_from).transpose()
}
