use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Metadata keys the pipeline reads and writes. Metadata is additive:
/// normalizers may introduce new keys freely, but an update must never drop
/// a key another path stored.
pub mod metadata_keys {
    /// Client-side dedup key attached to outbound sends before any provider
    /// confirmation exists.
    pub const TRACKING_ID: &str = "tracking_id";
    /// The untouched raw provider payload.
    pub const CHANNEL_SPECIFIC_DATA: &str = "channel_specific_data";
    pub const NORMALIZED_AT: &str = "normalized_at";
    pub const NORMALIZER_VERSION: &str = "normalizer_version";
    pub const NORMALIZATION_FAILED: &str = "normalization_failed";
    pub const ORIGINAL_HTML: &str = "original_html";
    pub const WEBHOOK_PROCESSED: &str = "webhook_processed";
    pub const PROVIDER_ID: &str = "provider_id";
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Position on the delivery ladder. Failed sits outside the ladder.
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Pending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 0,
        }
    }

    /// Resolves a status reported by a second delivery path against the
    /// stored one. Status only moves forward along
    /// pending -> sent -> delivered -> read; FAILED may be set from any
    /// state, and READ is never downgraded.
    pub fn merge(current: MessageStatus, incoming: MessageStatus) -> MessageStatus {
        if current == MessageStatus::Read {
            return MessageStatus::Read;
        }
        if incoming == MessageStatus::Failed {
            return MessageStatus::Failed;
        }
        if current == MessageStatus::Failed {
            // a later path confirming delivery supersedes a failed attempt
            return incoming;
        }
        if incoming.rank() > current.rank() {
            incoming
        } else {
            current
        }
    }
}

/// One inbound or outbound communication event.
///
/// Three distinct timestamps: `created_at` is ingestion time, while
/// `sent_at`/`received_at` are provider-reported event times and are
/// preferred for chronological ordering and display.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub conversation_id: Option<Uuid>,
    /// Provider message id. May take multiple forms per provider (a
    /// bracketed Message-ID for raw email vs. an opaque platform id).
    pub external_message_id: String,
    pub direction: MessageDirection,
    pub content: String,
    /// Email only; empty for other channels.
    pub subject: String,
    /// Denormalized sender identifiers for quick filtering.
    pub contact_email: String,
    pub contact_phone: String,
    pub sender_participant_id: Option<Uuid>,
    /// Denormalized record link for fast timeline queries.
    pub contact_record_id: Option<Uuid>,
    pub status: MessageStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Raw provider payload, dedup keys, processing markers.
    pub metadata: JsonValue,
}

impl Message {
    pub fn tracking_id(&self) -> Option<&str> {
        self.metadata
            .get(metadata_keys::TRACKING_ID)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// The timestamp used for chronological ordering: provider event time
    /// when known, ingestion time otherwise.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.sent_at
            .or(self.received_at)
            .unwrap_or(self.created_at)
    }
}

/// An immutable update command applied to a stored message through the
/// store component. All mutation of existing rows goes through this one
/// shape; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MessageUpdate {
    pub id: Uuid,
    pub external_message_id: Option<String>,
    pub status: Option<MessageStatus>,
    pub sender_participant_id: Option<Uuid>,
    pub contact_record_id: Option<Uuid>,
    pub sent_at: Option<DateTime<Utc>>,
    /// The fully merged metadata document. Computed by the dedup layer so
    /// the store never has to reason about key precedence.
    pub metadata: Option<JsonValue>,
}

/// Roles a participant can hold in a conversation, in precedence order.
/// When one pass qualifies a participant for several roles, the most
/// specific applies: sender > recipient > cc > bcc > member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParticipantRole {
    Sender,
    Recipient,
    Cc,
    Bcc,
    Member,
}

impl ParticipantRole {
    fn precedence(self) -> u8 {
        match self {
            ParticipantRole::Sender => 0,
            ParticipantRole::Recipient => 1,
            ParticipantRole::Cc => 2,
            ParticipantRole::Bcc => 3,
            ParticipantRole::Member => 4,
        }
    }

    /// The more specific of two roles.
    pub fn most_specific(a: ParticipantRole, b: ParticipantRole) -> ParticipantRole {
        if a.precedence() <= b.precedence() {
            a
        } else {
            b
        }
    }
}

/// Membership of a participant in a conversation. Unique per
/// (conversation, participant); marked inactive rather than deleted when a
/// participant leaves.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationParticipant {
    pub conversation_id: Uuid,
    pub participant_id: Uuid,
    pub role: ParticipantRole,
    pub is_active: bool,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub provider_participant_id: String,
    pub left_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        use MessageStatus::*;
        assert_eq!(MessageStatus::merge(Pending, Sent), Sent);
        assert_eq!(MessageStatus::merge(Sent, Delivered), Delivered);
        assert_eq!(MessageStatus::merge(Delivered, Read), Read);
        // never backward
        assert_eq!(MessageStatus::merge(Delivered, Sent), Delivered);
        assert_eq!(MessageStatus::merge(Read, Delivered), Read);
    }

    #[test]
    fn test_failed_from_any_state_except_read() {
        use MessageStatus::*;
        assert_eq!(MessageStatus::merge(Pending, Failed), Failed);
        assert_eq!(MessageStatus::merge(Delivered, Failed), Failed);
        assert_eq!(MessageStatus::merge(Read, Failed), Read);
    }

    #[test]
    fn test_delivery_confirmation_supersedes_failed() {
        assert_eq!(
            MessageStatus::merge(MessageStatus::Failed, MessageStatus::Delivered),
            MessageStatus::Delivered
        );
    }

    #[test]
    fn test_role_precedence() {
        use ParticipantRole::*;
        assert_eq!(ParticipantRole::most_specific(Recipient, Cc), Recipient);
        assert_eq!(ParticipantRole::most_specific(Cc, Sender), Sender);
        assert_eq!(ParticipantRole::most_specific(Bcc, Member), Bcc);
        assert_eq!(ParticipantRole::most_specific(Member, Member), Member);
    }
}
