use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    Email,
    Domain,
    Phone,
    Other,
}

/// A CRM business record as returned by the external record store. The
/// record store owns these; we only keep references.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordRef {
    pub id: Uuid,
    pub pipeline: String,
    pub title: String,
}

/// Join between a business record and a conversation, attributable to the
/// participant that produced the match. Unique per
/// (record, conversation, participant); separate participants in one
/// conversation may link it to different records.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordCommunicationLink {
    pub id: Uuid,
    pub record_id: Uuid,
    pub conversation_id: Uuid,
    pub participant_id: Uuid,
    pub match_type: MatchType,
    pub match_identifier: String,
    pub confidence_score: f64,
    /// Distinguishes sync-created links from webhook-created ones.
    pub created_by_sync: bool,
    /// False for secondary/company links.
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters backing a record's communications timeline header.
/// `total_conversations` counts distinct linked conversations (incremented
/// only on the first link for a (record, conversation) pair);
/// `total_messages` counts message events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordCommunicationProfile {
    pub record_id: Uuid,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
