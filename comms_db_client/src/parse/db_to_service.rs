//! Row structs fetched with `query_as` and their conversions into the
//! service models. Enum columns are stored as text and parsed here, so a
//! bad row surfaces as an error instead of a panic.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use models_comms::channel::{Channel, ChannelType};
use models_comms::conversation::{
    Conversation, ConversationPriority, ConversationStatus, ConversationType,
};
use models_comms::links::{MatchType, RecordCommunicationLink, RecordCommunicationProfile};
use models_comms::message::{
    ConversationParticipant, Message, MessageDirection, MessageStatus, ParticipantRole,
};
use models_comms::participant::Participant;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: Uuid,
    pub account_id: String,
    pub channel_type: String,
    pub name: Option<String>,
    pub is_sync_active: bool,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = anyhow::Error;

    fn try_from(row: ChannelRow) -> Result<Channel> {
        Ok(Channel {
            id: row.id,
            account_id: row.account_id,
            channel_type: parse_enum::<ChannelType>(&row.channel_type, "channel_type")?,
            name: row.name,
            is_sync_active: row.is_sync_active,
            message_count: row.message_count,
            last_message_at: row.last_message_at,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ParticipantRow {
    pub id: Uuid,
    pub email: String,
    pub phone: String,
    pub linkedin_member_urn: String,
    pub instagram_username: String,
    pub facebook_id: String,
    pub telegram_id: String,
    pub twitter_handle: String,
    pub name: String,
    pub metadata: JsonValue,
    pub record_id: Option<Uuid>,
    pub resolution_confidence: f64,
    pub resolution_method: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub secondary_record_id: Option<Uuid>,
    pub secondary_confidence: f64,
    pub secondary_resolution_method: String,
    pub secondary_pipeline: String,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Participant {
        Participant {
            id: row.id,
            email: row.email,
            phone: row.phone,
            linkedin_member_urn: row.linkedin_member_urn,
            instagram_username: row.instagram_username,
            facebook_id: row.facebook_id,
            telegram_id: row.telegram_id,
            twitter_handle: row.twitter_handle,
            name: row.name,
            metadata: row.metadata,
            record_id: row.record_id,
            resolution_confidence: row.resolution_confidence,
            resolution_method: row.resolution_method,
            resolved_at: row.resolved_at,
            secondary_record_id: row.secondary_record_id,
            secondary_confidence: row.secondary_confidence,
            secondary_resolution_method: row.secondary_resolution_method,
            secondary_pipeline: row.secondary_pipeline,
            total_conversations: row.total_conversations,
            total_messages: row.total_messages,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub external_thread_id: String,
    pub subject: String,
    pub status: String,
    pub priority: String,
    pub conversation_type: String,
    pub message_count: i64,
    pub participant_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub primary_record_id: Option<Uuid>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Conversation> {
        Ok(Conversation {
            id: row.id,
            channel_id: row.channel_id,
            external_thread_id: row.external_thread_id,
            subject: row.subject,
            status: parse_enum::<ConversationStatus>(&row.status, "status")?,
            priority: parse_enum::<ConversationPriority>(&row.priority, "priority")?,
            conversation_type: parse_enum::<ConversationType>(
                &row.conversation_type,
                "conversation_type",
            )?,
            message_count: row.message_count,
            participant_count: row.participant_count,
            last_message_at: row.last_message_at,
            primary_record_id: row.primary_record_id,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub external_message_id: String,
    pub direction: String,
    pub content: String,
    pub subject: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub sender_participant_id: Option<Uuid>,
    pub contact_record_id: Option<Uuid>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: JsonValue,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Message> {
        Ok(Message {
            id: row.id,
            channel_id: row.channel_id,
            conversation_id: row.conversation_id,
            external_message_id: row.external_message_id,
            direction: parse_enum::<MessageDirection>(&row.direction, "direction")?,
            content: row.content,
            subject: row.subject,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            sender_participant_id: row.sender_participant_id,
            contact_record_id: row.contact_record_id,
            status: parse_enum::<MessageStatus>(&row.status, "status")?,
            sent_at: row.sent_at,
            received_at: row.received_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: row.metadata,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationParticipantRow {
    pub conversation_id: Uuid,
    pub participant_id: Uuid,
    pub role: String,
    pub is_active: bool,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub provider_participant_id: String,
    pub left_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConversationParticipantRow> for ConversationParticipant {
    type Error = anyhow::Error;

    fn try_from(row: ConversationParticipantRow) -> Result<ConversationParticipant> {
        Ok(ConversationParticipant {
            conversation_id: row.conversation_id,
            participant_id: row.participant_id,
            role: parse_enum::<ParticipantRole>(&row.role, "role")?,
            is_active: row.is_active,
            message_count: row.message_count,
            last_message_at: row.last_message_at,
            last_read_at: row.last_read_at,
            unread_count: row.unread_count,
            provider_participant_id: row.provider_participant_id,
            left_at: row.left_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RecordLinkRow {
    pub id: Uuid,
    pub record_id: Uuid,
    pub conversation_id: Uuid,
    pub participant_id: Uuid,
    pub match_type: String,
    pub match_identifier: String,
    pub confidence_score: f64,
    pub created_by_sync: bool,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RecordLinkRow> for RecordCommunicationLink {
    type Error = anyhow::Error;

    fn try_from(row: RecordLinkRow) -> Result<RecordCommunicationLink> {
        Ok(RecordCommunicationLink {
            id: row.id,
            record_id: row.record_id,
            conversation_id: row.conversation_id,
            participant_id: row.participant_id,
            match_type: parse_enum::<MatchType>(&row.match_type, "match_type")?,
            match_identifier: row.match_identifier,
            confidence_score: row.confidence_score,
            created_by_sync: row.created_by_sync,
            is_primary: row.is_primary,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RecordProfileRow {
    pub record_id: Uuid,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecordProfileRow> for RecordCommunicationProfile {
    fn from(row: RecordProfileRow) -> RecordCommunicationProfile {
        RecordCommunicationProfile {
            record_id: row.record_id,
            total_conversations: row.total_conversations,
            total_messages: row.total_messages,
            last_message_at: row.last_message_at,
            updated_at: row.updated_at,
        }
    }
}

fn parse_enum<T: std::str::FromStr>(value: &str, column: &'static str) -> Result<T> {
    value
        .parse::<T>()
        .ok()
        .with_context(|| format!("unexpected value '{value}' in column {column}"))
}
