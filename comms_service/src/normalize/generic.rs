use crate::normalize::html::html_to_text;
use crate::normalize::{as_object, parse_address_entry, recipients_at, str_at, timestamp_at};
use models_comms::channel::ChannelType;
use models_comms::identifier::Identifier;
use models_comms::message::metadata_keys;
use models_comms::normalized::{NormalizationError, NormalizedMessage};
use serde_json::Value as JsonValue;

/// Fallback for providers with no dedicated strategy. Best-effort: the
/// sender is classified from whatever identifier shape the payload carries,
/// and the message is still fully retained via `channel_specific_data`.
pub fn normalize(raw: &JsonValue) -> Result<NormalizedMessage, NormalizationError> {
    let obj = as_object(raw)?;
    let mut message = NormalizedMessage::new(ChannelType::Generic);

    if let Some(from) = obj.get("from").or(obj.get("sender")) {
        match from {
            JsonValue::Object(_) => {
                if let Some(entry) = parse_address_entry(from) {
                    message.sender.email = entry.email;
                    message.sender.name = entry.name;
                }
            }
            JsonValue::String(s) => match Identifier::classify(s) {
                Some(Identifier::Email(email)) => message.sender.email = email,
                Some(Identifier::Phone(phone)) => {
                    message.sender.phone = phone;
                    message.sender.provider_id = s.to_string();
                }
                Some(Identifier::ProviderId(id)) => message.sender.provider_id = id,
                Some(Identifier::LinkedinUrn(urn)) => message.sender.linkedin_urn = urn,
                None => {}
            },
            _ => {}
        }
    }

    if message.sender.name.is_empty() {
        message.sender.name = str_at(obj, &["sender_name", "from_name"])
            .unwrap_or_default()
            .to_string();
    }

    message.to = recipients_at(obj, "to");
    message.cc = recipients_at(obj, "cc");
    message.bcc = recipients_at(obj, "bcc");

    message.subject = str_at(obj, &["subject"]).unwrap_or_default().to_string();

    match str_at(obj, &["text", "content", "body", "message"]) {
        Some(text) => message.content = text.to_string(),
        None => {
            if let Some(body_html) = str_at(obj, &["html", "body_html"]) {
                message.content = html_to_text(body_html);
                message.metadata.insert(
                    metadata_keys::ORIGINAL_HTML.to_string(),
                    JsonValue::String(body_html.to_string()),
                );
            }
        }
    }

    message.external_message_id = str_at(obj, &["id", "message_id", "external_message_id"])
        .unwrap_or_default()
        .to_string();
    message.external_thread_id =
        str_at(obj, &["thread_id", "conversation_id", "chat_id", "external_thread_id"])
            .unwrap_or_default()
            .to_string();

    if let Some(ts) = timestamp_at(obj, &["timestamp", "date", "created_at", "sent_at"]) {
        message.sent_at = Some(ts);
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_bare_sender_strings() {
        let email = normalize(&json!({"from": "jane@acme.com", "text": "hi"})).unwrap();
        assert_eq!(email.sender.email, "jane@acme.com");

        let phone = normalize(&json!({"from": "+27849977040", "text": "hi"})).unwrap();
        assert_eq!(phone.sender.phone, "27849977040");

        let opaque = normalize(&json!({"from": "user_9f2", "text": "hi"})).unwrap();
        assert_eq!(opaque.sender.provider_id, "user_9f2");
    }

    #[test]
    fn test_whatsapp_style_jid_in_generic_payload() {
        let message =
            normalize(&json!({"from": "27849977040@s.whatsapp.net", "text": "hi"})).unwrap();
        assert_eq!(message.sender.phone, "27849977040");
    }

    #[test]
    fn test_content_key_variants() {
        for key in ["text", "content", "body", "message"] {
            let message = normalize(&json!({"from": "a@b.com", key: "payload"})).unwrap();
            assert_eq!(message.content, "payload", "content key {key}");
        }
    }
}
