//! Deduplication across delivery paths. The same logical message can reach
//! us as a webhook push, a polling pull and an outbound send-confirmation,
//! each with its own identifier format. Dedup checks run in priority
//! order: tracking id first (attached client-side to our own sends before
//! any provider confirmation exists), then exact external id. The
//! content+direction heuristic lives in the reconcile utility, off the hot
//! path.

use crate::ports::CommsRepo;
use anyhow::Result;
use chrono::Utc;
use models_comms::channel::Channel;
use models_comms::message::{
    metadata_keys, Message, MessageDirection, MessageStatus, MessageUpdate,
};
use models_comms::normalized::NormalizedMessage;
use models_comms::participant::Participant;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Metadata marker on messages whose external id came from the send API
/// and is expected to be superseded by the provider's authoritative id.
pub const PROVISIONAL_EXTERNAL_ID: &str = "provisional_external_id";

#[derive(Debug)]
pub enum MessageAction {
    Create(Message),
    Update(MessageUpdate),
}

/// Decides create-vs-update for one normalized message.
#[tracing::instrument(skip_all)]
pub async fn plan_message_action<R: CommsRepo>(
    repo: &R,
    channel: &Channel,
    conversation_id: Uuid,
    normalized: &NormalizedMessage,
    sender: Option<&Participant>,
) -> Result<MessageAction> {
    if let Some(tracking_id) = normalized.tracking_id() {
        if let Some(existing) = repo
            .find_message_by_tracking_id(channel.id, tracking_id)
            .await?
        {
            return Ok(MessageAction::Update(plan_update(
                &existing, normalized, sender,
            )));
        }
    }

    if !normalized.external_message_id.is_empty() {
        if let Some(existing) = repo
            .find_message_by_external_id(conversation_id, &normalized.external_message_id)
            .await?
        {
            return Ok(MessageAction::Update(plan_update(
                &existing, normalized, sender,
            )));
        }
    }

    Ok(MessageAction::Create(build_message(
        channel,
        conversation_id,
        normalized,
        sender,
    )))
}

/// Maps a normalized message onto a fresh row.
pub fn build_message(
    channel: &Channel,
    conversation_id: Uuid,
    normalized: &NormalizedMessage,
    sender: Option<&Participant>,
) -> Message {
    let now = Utc::now();

    Message {
        id: Uuid::now_v7(),
        channel_id: channel.id,
        conversation_id: Some(conversation_id),
        external_message_id: normalized.external_message_id.clone(),
        direction: normalized.direction,
        content: normalized.content.clone(),
        subject: normalized.subject.clone(),
        contact_email: normalized.sender.email.clone(),
        contact_phone: normalized.sender.phone.clone(),
        sender_participant_id: sender.map(|p| p.id),
        contact_record_id: sender.and_then(|p| p.record_id),
        status: normalized.status,
        sent_at: normalized.sent_at,
        received_at: match normalized.direction {
            MessageDirection::Inbound => normalized.sent_at,
            MessageDirection::Outbound => None,
        },
        created_at: now,
        updated_at: now,
        metadata: JsonValue::Object(normalized.metadata.clone()),
    }
}

/// Builds the update command a second delivery of an existing message
/// resolves to: additive metadata merge, external-id upgrade only off a
/// provisional id, forward-only status, and backfill-only participant and
/// record pointers.
pub fn plan_update(
    existing: &Message,
    normalized: &NormalizedMessage,
    sender: Option<&Participant>,
) -> MessageUpdate {
    let mut merged_metadata = merge_metadata(&existing.metadata, &normalized.metadata);

    let external_message_id = upgraded_external_id(existing, normalized);
    if external_message_id.is_some() {
        // the provisional id is gone; drop the marker with it
        if let Some(obj) = merged_metadata.as_object_mut() {
            obj.remove(PROVISIONAL_EXTERNAL_ID);
        }
    }

    MessageUpdate {
        id: existing.id,
        external_message_id,
        status: Some(MessageStatus::merge(existing.status, normalized.status)),
        sender_participant_id: match existing.sender_participant_id {
            Some(_) => None,
            None => sender.map(|p| p.id),
        },
        contact_record_id: match existing.contact_record_id {
            Some(_) => None,
            None => sender.and_then(|p| p.record_id),
        },
        sent_at: match existing.sent_at {
            Some(_) => None,
            None => normalized.sent_at,
        },
        metadata: Some(merged_metadata),
    }
}

fn upgraded_external_id(existing: &Message, normalized: &NormalizedMessage) -> Option<String> {
    if normalized.external_message_id.is_empty()
        || normalized.external_message_id == existing.external_message_id
    {
        return None;
    }

    let existing_is_provisional = existing
        .metadata
        .get(PROVISIONAL_EXTERNAL_ID)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if existing.external_message_id.is_empty() || existing_is_provisional {
        Some(normalized.external_message_id.clone())
    } else {
        None
    }
}

/// Additive metadata merge: new keys are added, the raw-payload key is
/// replaced with the latest delivery, and every other existing key is left
/// untouched. Nothing is ever dropped wholesale.
pub fn merge_metadata(existing: &JsonValue, incoming: &Map<String, JsonValue>) -> JsonValue {
    let mut merged = existing
        .as_object()
        .cloned()
        .unwrap_or_default();

    for (key, value) in incoming {
        if key == metadata_keys::CHANNEL_SPECIFIC_DATA || !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    JsonValue::Object(merged)
}

/// A bracketed RFC 5322 Message-ID, as opposed to an opaque platform id.
pub fn is_bracketed_message_id(id: &str) -> bool {
    id.starts_with('<') && id.ends_with('>')
}

#[cfg(test)]
mod tests {
    use super::*;
    use models_comms::channel::ChannelType;
    use serde_json::json;

    fn existing_message(external_id: &str, provisional: bool) -> Message {
        let mut metadata = Map::new();
        metadata.insert(
            metadata_keys::TRACKING_ID.to_string(),
            JsonValue::String("t1".to_string()),
        );
        if provisional {
            metadata.insert(PROVISIONAL_EXTERNAL_ID.to_string(), JsonValue::Bool(true));
        }
        metadata.insert("first_seen_via".to_string(), json!("send_api"));

        Message {
            id: Uuid::now_v7(),
            channel_id: Uuid::now_v7(),
            conversation_id: Some(Uuid::now_v7()),
            external_message_id: external_id.to_string(),
            direction: MessageDirection::Outbound,
            content: "hello".to_string(),
            subject: String::new(),
            contact_email: String::new(),
            contact_phone: String::new(),
            sender_participant_id: None,
            contact_record_id: None,
            status: MessageStatus::Sent,
            sent_at: Some(Utc::now()),
            received_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: JsonValue::Object(metadata),
        }
    }

    #[test]
    fn test_provisional_external_id_upgraded() {
        let existing = existing_message("provisional_123", true);
        let mut normalized = NormalizedMessage::new(ChannelType::Email);
        normalized.external_message_id = "<gmail-id@mail.com>".to_string();

        let update = plan_update(&existing, &normalized, None);
        assert_eq!(
            update.external_message_id.as_deref(),
            Some("<gmail-id@mail.com>")
        );
        // the provisional marker is dropped along with the old id
        let merged = update.metadata.unwrap();
        assert!(merged.get(PROVISIONAL_EXTERNAL_ID).is_none());
        // and the pre-existing metadata survives
        assert_eq!(merged.get("first_seen_via"), Some(&json!("send_api")));
    }

    #[test]
    fn test_authoritative_external_id_never_regressed() {
        let existing = existing_message("platform_opaque_id", false);
        let mut normalized = NormalizedMessage::new(ChannelType::Email);
        normalized.external_message_id = "<other@mail.com>".to_string();

        let update = plan_update(&existing, &normalized, None);
        assert!(update.external_message_id.is_none());
    }

    #[test]
    fn test_metadata_merge_is_additive() {
        let existing = json!({"a": 1, "channel_specific_data": {"old": true}});
        let mut incoming = Map::new();
        incoming.insert("a".to_string(), json!(2));
        incoming.insert("b".to_string(), json!(3));
        incoming.insert(
            metadata_keys::CHANNEL_SPECIFIC_DATA.to_string(),
            json!({"new": true}),
        );

        let merged = merge_metadata(&existing, &incoming);
        // existing keys are not blindly overwritten
        assert_eq!(merged["a"], json!(1));
        // new keys are added
        assert_eq!(merged["b"], json!(3));
        // the raw payload key is replaced with the latest delivery
        assert_eq!(merged[metadata_keys::CHANNEL_SPECIFIC_DATA], json!({"new": true}));
    }

    #[test]
    fn test_status_never_downgraded_on_update() {
        let mut existing = existing_message("x", false);
        existing.status = MessageStatus::Read;
        let mut normalized = NormalizedMessage::new(ChannelType::Email);
        normalized.status = MessageStatus::Delivered;

        let update = plan_update(&existing, &normalized, None);
        assert_eq!(update.status, Some(MessageStatus::Read));
    }

    #[test]
    fn test_bracketed_id_detection() {
        assert!(is_bracketed_message_id("<abc@mail.com>"));
        assert!(!is_bracketed_message_id("platform_123"));
    }
}
