use crate::normalize::{as_object, str_at, timestamp_at, DIRECTION_FROM_PROVIDER};
use comms_utils::split_whatsapp_id;
use models_comms::channel::ChannelType;
use models_comms::message::MessageDirection;
use models_comms::normalized::{NormalizationError, NormalizedAttachment, NormalizedMessage};
use serde_json::Value as JsonValue;

/// WhatsApp payloads address people by JID (`<digits>@s.whatsapp.net`);
/// the bare digits are the phone number. `from_me` states the direction
/// explicitly when present.
pub fn normalize(raw: &JsonValue) -> Result<NormalizedMessage, NormalizationError> {
    let obj = as_object(raw)?;
    let mut message = NormalizedMessage::new(ChannelType::Whatsapp);

    let from = str_at(obj, &["from", "sender_id", "participant"])
        .ok_or(NormalizationError::MissingField("from"))?;

    if let Some(phone) = split_whatsapp_id(from) {
        message.sender.phone = phone;
        message.sender.provider_id = from.to_string();
    } else {
        message.sender.phone = from.to_string();
        message.sender.provider_id = from.to_string();
    }

    message.sender.name = str_at(obj, &["push_name", "profile_name", "notify_name"])
        .unwrap_or_default()
        .to_string();

    message.content = str_at(obj, &["text", "body", "caption"])
        .unwrap_or_default()
        .to_string();

    message.external_message_id = str_at(obj, &["id", "message_id"])
        .unwrap_or_default()
        .to_string();

    // group chats carry a chat id; direct chats fall back to the sender JID
    if let Some(chat_id) = str_at(obj, &["chat_id", "remote_jid"]) {
        message.external_thread_id = split_whatsapp_id(chat_id).unwrap_or(chat_id.to_string());
    }

    if let Some(ts) = timestamp_at(obj, &["timestamp", "message_timestamp", "t"]) {
        message.sent_at = Some(ts);
    }

    if let Some(from_me) = obj.get("from_me").or(obj.get("fromMe")).and_then(|v| v.as_bool()) {
        message.direction = if from_me {
            MessageDirection::Outbound
        } else {
            MessageDirection::Inbound
        };
        message
            .metadata
            .insert(DIRECTION_FROM_PROVIDER.to_string(), JsonValue::Bool(true));
    }

    if obj.get("is_group").and_then(|v| v.as_bool()).unwrap_or(false) {
        message
            .metadata
            .insert("is_group".to_string(), JsonValue::Bool(true));
    }

    if let Some(JsonValue::Array(media)) = obj.get("media") {
        message.attachments = media
            .iter()
            .filter_map(|v| v.as_object())
            .map(|entry| NormalizedAttachment {
                id: str_at(entry, &["id", "media_id"]).unwrap_or_default().to_string(),
                filename: str_at(entry, &["filename"]).unwrap_or_default().to_string(),
                content_type: str_at(entry, &["mime_type", "content_type"])
                    .unwrap_or_default()
                    .to_string(),
                size: entry.get("size").and_then(|v| v.as_i64()).unwrap_or(0),
                url: str_at(entry, &["url"]).unwrap_or_default().to_string(),
            })
            .collect();
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jid_split_into_phone() {
        let message = normalize(&json!({
            "from": "27849977040@s.whatsapp.net",
            "text": "hi",
            "timestamp": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(message.sender.phone, "27849977040");
        assert_eq!(message.sender.provider_id, "27849977040@s.whatsapp.net");
        assert!(message.sent_at.is_some());
    }

    #[test]
    fn test_from_me_states_direction() {
        let message = normalize(&json!({
            "from": "27849977040@s.whatsapp.net",
            "text": "hi",
            "from_me": true
        }))
        .unwrap();
        assert_eq!(message.direction, MessageDirection::Outbound);
        assert_eq!(
            message.metadata.get(DIRECTION_FROM_PROVIDER),
            Some(&JsonValue::Bool(true))
        );
    }

    #[test]
    fn test_group_chat_id_becomes_thread() {
        let message = normalize(&json!({
            "from": "27849977040@s.whatsapp.net",
            "chat_id": "1203630@g.us",
            "text": "hi",
            "is_group": true
        }))
        .unwrap();
        assert_eq!(message.external_thread_id, "1203630@g.us");
        assert_eq!(message.metadata.get("is_group"), Some(&JsonValue::Bool(true)));
    }

    #[test]
    fn test_missing_from_is_an_error() {
        assert!(normalize(&json!({"text": "hi"})).is_err());
    }
}
