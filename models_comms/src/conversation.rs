use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
    Spam,
    Deleted,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationType {
    Direct,
    Group,
    Channel,
    Broadcast,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationPriority {
    Low,
    Normal,
    High,
}

/// A thread on one channel. `message_count`, `participant_count` and
/// `last_message_at` are cached aggregates recomputed from the message set,
/// never incremented, so they survive bulk operations and concurrent
/// writers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub channel_id: Uuid,
    /// Provider thread identity. Empty for providers without threading;
    /// unique per channel when non-empty.
    pub external_thread_id: String,
    pub subject: String,
    pub status: ConversationStatus,
    pub priority: ConversationPriority,
    pub conversation_type: ConversationType,
    pub message_count: i64,
    pub participant_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub primary_record_id: Option<Uuid>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Infers the conversation type from the participant count and provider
/// metadata flags. Metadata flags win over the count because providers mark
/// broadcasts/channels explicitly while the member list may be partial.
pub fn infer_conversation_type(participant_count: i64, metadata: &JsonValue) -> ConversationType {
    let flag = |key: &str| metadata.get(key).and_then(|v| v.as_bool()).unwrap_or(false);

    if flag("is_broadcast") {
        return ConversationType::Broadcast;
    }
    if flag("is_channel") {
        return ConversationType::Channel;
    }
    if flag("is_group") || participant_count > 2 {
        return ConversationType::Group;
    }
    ConversationType::Direct
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_direct_for_two_participants() {
        assert_eq!(
            infer_conversation_type(2, &json!({})),
            ConversationType::Direct
        );
    }

    #[test]
    fn test_infer_group_above_two() {
        assert_eq!(
            infer_conversation_type(3, &json!({})),
            ConversationType::Group
        );
    }

    #[test]
    fn test_metadata_flags_win_over_count() {
        assert_eq!(
            infer_conversation_type(2, &json!({"is_broadcast": true})),
            ConversationType::Broadcast
        );
        assert_eq!(
            infer_conversation_type(2, &json!({"is_channel": true})),
            ConversationType::Channel
        );
        assert_eq!(
            infer_conversation_type(2, &json!({"is_group": true})),
            ConversationType::Group
        );
    }
}
