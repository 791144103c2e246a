use crate::channel::ChannelType;
use crate::message::{metadata_keys, MessageDirection, MessageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// A malformed or structurally unexpected provider payload. Carried in an
/// explicit `Result`; the ingestion pipeline converts it into a synthetic
/// FAILED message rather than propagating.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// The identity hints a normalizer could extract for the message sender.
/// Empty strings mean unknown; downstream code treats them as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedSender {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub provider_id: String,
    pub linkedin_urn: String,
}

impl NormalizedSender {
    pub fn is_empty(&self) -> bool {
        self.email.is_empty()
            && self.phone.is_empty()
            && self.provider_id.is_empty()
            && self.linkedin_urn.is_empty()
    }
}

/// One `to`/`cc`/`bcc` entry. Providers send these as either a
/// `{email, name}` object or a bare email string; normalizers fold both
/// shapes into this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedRecipient {
    pub email: String,
    pub name: String,
}

/// Channel-agnostic attachment shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedAttachment {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub url: String,
}

/// The connected account's own identity, used to decide message direction:
/// a message whose sender matches the account is outbound.
#[derive(Debug, Clone, Default)]
pub struct AccountContext {
    pub account_id: String,
    pub account_email: String,
    pub account_phone: String,
    pub provider_account_id: String,
}

impl AccountContext {
    /// Whether a sender identity belongs to this account.
    pub fn owns_sender(&self, sender: &NormalizedSender) -> bool {
        (!sender.email.is_empty() && sender.email == self.account_email)
            || (!sender.phone.is_empty() && sender.phone == self.account_phone)
            || (!sender.provider_id.is_empty() && sender.provider_id == self.provider_account_id)
    }
}

/// The canonical message shape every channel normalizer produces. All
/// downstream code sees only this; the raw payload survives opaquely under
/// `metadata.channel_specific_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub channel_type: ChannelType,
    pub external_message_id: String,
    pub external_thread_id: String,
    pub direction: MessageDirection,
    pub status: MessageStatus,
    pub content: String,
    /// Email only; empty elsewhere.
    pub subject: String,
    pub sender: NormalizedSender,
    pub to: Vec<NormalizedRecipient>,
    pub cc: Vec<NormalizedRecipient>,
    pub bcc: Vec<NormalizedRecipient>,
    pub attachments: Vec<NormalizedAttachment>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: Map<String, JsonValue>,
}

impl NormalizedMessage {
    pub fn new(channel_type: ChannelType) -> NormalizedMessage {
        NormalizedMessage {
            channel_type,
            external_message_id: String::new(),
            external_thread_id: String::new(),
            direction: MessageDirection::Inbound,
            status: MessageStatus::Delivered,
            content: String::new(),
            subject: String::new(),
            sender: NormalizedSender::default(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            attachments: Vec::new(),
            sent_at: None,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// The explicit branch a normalization failure turns into: a FAILED
    /// message describing the error, with the raw payload retained so
    /// nothing is lost.
    pub fn failure(
        channel_type: ChannelType,
        raw_payload: &JsonValue,
        error: &NormalizationError,
    ) -> NormalizedMessage {
        let mut message = NormalizedMessage::new(channel_type);
        message.status = MessageStatus::Failed;
        message.content = format!("Message could not be processed: {error}");
        message.metadata.insert(
            metadata_keys::NORMALIZATION_FAILED.to_string(),
            JsonValue::Bool(true),
        );
        message.metadata.insert(
            metadata_keys::CHANNEL_SPECIFIC_DATA.to_string(),
            raw_payload.clone(),
        );
        message
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.metadata
            .get(metadata_keys::TRACKING_ID)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
