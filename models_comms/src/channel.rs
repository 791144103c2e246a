use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// The kind of provider a channel is connected to. `Social` and `Messaging`
/// cover providers that share a generic payload shape (Instagram/Facebook/X
/// and Telegram-style apps respectively); `Generic` is the fallback for
/// providers we have no dedicated normalizer for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelType {
    Email,
    Whatsapp,
    Linkedin,
    Social,
    Messaging,
    Generic,
}

/// One connected provider account's channel. Conversations hang off a
/// channel; `message_count`/`last_message_at` are derived aggregates
/// recomputed from messages, never incremented.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Channel {
    pub id: Uuid,
    /// The provider-side account identifier this channel syncs for.
    pub account_id: String,
    pub channel_type: ChannelType,
    pub name: Option<String>,
    /// When false, webhook and sync traffic for this channel is dropped.
    pub is_sync_active: bool,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
