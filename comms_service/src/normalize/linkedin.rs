use crate::normalize::{as_object, str_at, timestamp_at};
use models_comms::channel::ChannelType;
use models_comms::normalized::{NormalizationError, NormalizedMessage};
use serde_json::Value as JsonValue;

/// LinkedIn messaging payloads identify people by member URN
/// (`urn:li:member:...`) plus an opaque per-account provider id.
pub fn normalize(raw: &JsonValue) -> Result<NormalizedMessage, NormalizationError> {
    let obj = as_object(raw)?;
    let mut message = NormalizedMessage::new(ChannelType::Linkedin);

    if let Some(JsonValue::Object(sender)) = obj.get("sender") {
        message.sender.linkedin_urn = str_at(sender, &["member_urn", "urn"])
            .unwrap_or_default()
            .to_string();
        message.sender.provider_id = str_at(sender, &["provider_id", "id"])
            .unwrap_or_default()
            .to_string();
        message.sender.name = str_at(sender, &["name", "display_name"])
            .unwrap_or_default()
            .to_string();
    } else {
        message.sender.linkedin_urn = str_at(obj, &["sender_urn", "member_urn"])
            .unwrap_or_default()
            .to_string();
        message.sender.provider_id = str_at(obj, &["sender_id", "provider_id"])
            .unwrap_or_default()
            .to_string();
        message.sender.name = str_at(obj, &["sender_name"]).unwrap_or_default().to_string();
    }

    if message.sender.linkedin_urn.is_empty() && message.sender.provider_id.is_empty() {
        return Err(NormalizationError::MissingField("sender"));
    }

    message.content = str_at(obj, &["text", "body", "message_text"])
        .unwrap_or_default()
        .to_string();

    message.external_message_id = str_at(obj, &["message_urn", "message_id", "id"])
        .unwrap_or_default()
        .to_string();
    message.external_thread_id = str_at(obj, &["conversation_urn", "thread_urn", "chat_id"])
        .unwrap_or_default()
        .to_string();

    if let Some(ts) = timestamp_at(obj, &["timestamp", "created_at", "delivered_at"]) {
        message.sent_at = Some(ts);
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enriched_sender_object() {
        let message = normalize(&json!({
            "sender": {
                "member_urn": "urn:li:member:12345",
                "provider_id": "ACoAA123",
                "name": "Jane Doe"
            },
            "text": "Thanks for connecting",
            "conversation_urn": "urn:li:conversation:999",
            "message_urn": "urn:li:message:777",
            "timestamp": 1704103200000i64
        }))
        .unwrap();

        assert_eq!(message.sender.linkedin_urn, "urn:li:member:12345");
        assert_eq!(message.sender.provider_id, "ACoAA123");
        assert_eq!(message.external_thread_id, "urn:li:conversation:999");
        assert!(message.sent_at.is_some());
    }

    #[test]
    fn test_flat_sender_fields() {
        let message = normalize(&json!({
            "sender_urn": "urn:li:member:5",
            "sender_name": "Bob",
            "text": "hello"
        }))
        .unwrap();
        assert_eq!(message.sender.linkedin_urn, "urn:li:member:5");
        assert_eq!(message.sender.name, "Bob");
    }

    #[test]
    fn test_sender_required() {
        assert!(normalize(&json!({"text": "hello"})).is_err());
    }
}
