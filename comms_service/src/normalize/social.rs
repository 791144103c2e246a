use crate::normalize::{as_object, str_at, timestamp_at};
use models_comms::channel::ChannelType;
use models_comms::normalized::{NormalizationError, NormalizedMessage};
use serde_json::Value as JsonValue;

/// Generic social DM shape shared by Instagram/Facebook/X-style providers:
/// an opaque sender id, a display name and a flat text body. The concrete
/// platform name rides along in metadata.
pub fn normalize(raw: &JsonValue) -> Result<NormalizedMessage, NormalizationError> {
    let obj = as_object(raw)?;
    let mut message = NormalizedMessage::new(ChannelType::Social);

    message.sender.provider_id = str_at(obj, &["sender_id", "from_id", "author_id"])
        .ok_or(NormalizationError::MissingField("sender_id"))?
        .to_string();
    message.sender.name = str_at(obj, &["sender_name", "author_name", "username"])
        .unwrap_or_default()
        .to_string();

    message.content = str_at(obj, &["text", "message", "body"])
        .unwrap_or_default()
        .to_string();

    message.external_message_id = str_at(obj, &["id", "message_id"])
        .unwrap_or_default()
        .to_string();
    message.external_thread_id = str_at(obj, &["thread_id", "conversation_id", "chat_id"])
        .unwrap_or_default()
        .to_string();

    if let Some(ts) = timestamp_at(obj, &["timestamp", "created_time", "created_at"]) {
        message.sent_at = Some(ts);
    }

    if let Some(platform) = str_at(obj, &["platform", "provider"]) {
        message.metadata.insert(
            "platform".to_string(),
            JsonValue::String(platform.to_string()),
        );
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_social_dm() {
        let message = normalize(&json!({
            "sender_id": "ig_881",
            "sender_name": "jane.doe",
            "text": "love the product",
            "thread_id": "dm_42",
            "platform": "instagram",
            "timestamp": 1704103200
        }))
        .unwrap();

        assert_eq!(message.sender.provider_id, "ig_881");
        assert_eq!(message.external_thread_id, "dm_42");
        assert_eq!(
            message.metadata.get("platform").and_then(|v| v.as_str()),
            Some("instagram")
        );
    }

    #[test]
    fn test_sender_id_required() {
        assert!(normalize(&json!({"text": "hi"})).is_err());
    }
}
