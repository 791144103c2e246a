use crate::normalize::{as_object, str_at, timestamp_at};
use models_comms::channel::ChannelType;
use models_comms::normalized::{NormalizationError, NormalizedMessage};
use serde_json::Value as JsonValue;

/// Generic messaging-app shape (Telegram-style): a sender object carrying
/// an id and optionally a phone number, plus a conversation id.
pub fn normalize(raw: &JsonValue) -> Result<NormalizedMessage, NormalizationError> {
    let obj = as_object(raw)?;
    let mut message = NormalizedMessage::new(ChannelType::Messaging);

    match obj.get("sender") {
        Some(JsonValue::Object(sender)) => {
            message.sender.provider_id = str_at(sender, &["id", "user_id"])
                .unwrap_or_default()
                .to_string();
            message.sender.phone = str_at(sender, &["phone", "phone_number"])
                .unwrap_or_default()
                .to_string();
            message.sender.name = str_at(sender, &["name", "username", "first_name"])
                .unwrap_or_default()
                .to_string();
        }
        _ => {
            message.sender.provider_id = str_at(obj, &["sender_id", "from"])
                .unwrap_or_default()
                .to_string();
            message.sender.name = str_at(obj, &["sender_name"]).unwrap_or_default().to_string();
        }
    }

    if message.sender.provider_id.is_empty() && message.sender.phone.is_empty() {
        return Err(NormalizationError::MissingField("sender"));
    }

    message.content = str_at(obj, &["text", "message", "body", "caption"])
        .unwrap_or_default()
        .to_string();

    message.external_message_id = str_at(obj, &["id", "message_id"])
        .unwrap_or_default()
        .to_string();
    message.external_thread_id = str_at(obj, &["conversation_id", "chat_id", "thread_id"])
        .unwrap_or_default()
        .to_string();

    if let Some(ts) = timestamp_at(obj, &["timestamp", "date", "created_at"]) {
        message.sent_at = Some(ts);
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sender_object_with_phone() {
        let message = normalize(&json!({
            "sender": {"id": "tg_15", "phone": "+1 555 123 4567", "name": "Bob"},
            "text": "when can we talk?",
            "chat_id": "chat_9",
            "date": 1704103200
        }))
        .unwrap();
        assert_eq!(message.sender.provider_id, "tg_15");
        assert_eq!(message.sender.phone, "+1 555 123 4567");
        assert_eq!(message.external_thread_id, "chat_9");
    }

    #[test]
    fn test_flat_sender_id() {
        let message = normalize(&json!({"sender_id": "u1", "text": "hi"})).unwrap();
        assert_eq!(message.sender.provider_id, "u1");
    }

    #[test]
    fn test_sender_required() {
        assert!(normalize(&json!({"text": "hi"})).is_err());
    }
}
