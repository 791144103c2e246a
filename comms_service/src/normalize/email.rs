use crate::normalize::html::html_to_text;
use crate::normalize::{as_object, parse_address_entry, recipients_at, str_at, timestamp_at};
use models_comms::channel::ChannelType;
use models_comms::message::metadata_keys;
use models_comms::normalized::{
    NormalizationError, NormalizedAttachment, NormalizedMessage,
};
use serde_json::{Map, Value as JsonValue};

/// Email payloads: `from` may be a `{email, name}` object or a header
/// string, recipient lists hold either shape per entry, and the body may be
/// plain text, HTML, or both.
pub fn normalize(raw: &JsonValue) -> Result<NormalizedMessage, NormalizationError> {
    let obj = as_object(raw)?;
    let mut message = NormalizedMessage::new(ChannelType::Email);

    if let Some(entry) = obj.get("from").and_then(parse_address_entry) {
        message.sender.email = entry.email;
        message.sender.name = entry.name;
    }

    message.to = recipients_at(obj, "to");
    message.cc = recipients_at(obj, "cc");
    message.bcc = recipients_at(obj, "bcc");

    message.subject = str_at(obj, &["subject"]).unwrap_or_default().to_string();

    match str_at(obj, &["body_text", "text", "body", "snippet"]) {
        Some(text) => message.content = text.to_string(),
        None => {
            // HTML-only body: strip to a text fallback, keep the original
            if let Some(body_html) = str_at(obj, &["body_html", "html"]) {
                message.content = html_to_text(body_html);
                message.metadata.insert(
                    metadata_keys::ORIGINAL_HTML.to_string(),
                    JsonValue::String(body_html.to_string()),
                );
            }
        }
    }

    message.external_message_id = str_at(obj, &["message_id", "external_message_id", "id"])
        .unwrap_or_default()
        .to_string();
    message.external_thread_id = str_at(obj, &["thread_id", "external_thread_id"])
        .unwrap_or_default()
        .to_string();

    if let Some(ts) = timestamp_at(obj, &["date", "timestamp", "internal_date", "sent_at"]) {
        message.sent_at = Some(ts);
    }

    if let Some(JsonValue::Array(entries)) = obj.get("attachments") {
        message.attachments = entries
            .iter()
            .filter_map(|v| v.as_object())
            .map(parse_attachment)
            .collect();
    }

    Ok(message)
}

fn parse_attachment(entry: &Map<String, JsonValue>) -> NormalizedAttachment {
    NormalizedAttachment {
        id: str_at(entry, &["id", "attachment_id"]).unwrap_or_default().to_string(),
        filename: str_at(entry, &["filename", "name"]).unwrap_or_default().to_string(),
        content_type: str_at(entry, &["content_type", "mime_type"])
            .unwrap_or_default()
            .to_string(),
        size: entry.get("size").and_then(|v| v.as_i64()).unwrap_or(0),
        url: str_at(entry, &["url", "download_url"]).unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_as_object() {
        let message = normalize(&json!({
            "from": {"email": "Jane@Acme.com", "name": "Jane Doe"},
            "to": [{"email": "bob@acme.com"}],
            "subject": "Quote",
            "body_text": "Please see attached.",
            "message_id": "<abc@mail.acme.com>",
            "thread_id": "t-99"
        }))
        .unwrap();

        assert_eq!(message.sender.email, "Jane@Acme.com");
        assert_eq!(message.sender.name, "Jane Doe");
        assert_eq!(message.to.len(), 1);
        assert_eq!(message.subject, "Quote");
        assert_eq!(message.external_message_id, "<abc@mail.acme.com>");
        assert_eq!(message.external_thread_id, "t-99");
    }

    #[test]
    fn test_from_as_header_string() {
        let message = normalize(&json!({
            "from": "Jane Doe <jane@acme.com>",
            "text": "hi"
        }))
        .unwrap();
        assert_eq!(message.sender.email, "jane@acme.com");
        assert_eq!(message.sender.name, "Jane Doe");
    }

    #[test]
    fn test_recipient_list_of_bare_strings() {
        let message = normalize(&json!({
            "from": "a@b.com",
            "to": ["x@y.com", "Carol <c@d.com>"],
            "cc": "e@f.com",
            "text": "hi"
        }))
        .unwrap();
        assert_eq!(message.to.len(), 2);
        assert_eq!(message.to[1].name, "Carol");
        assert_eq!(message.cc.len(), 1);
    }

    #[test]
    fn test_html_only_body_gets_text_fallback() {
        let message = normalize(&json!({
            "from": "a@b.com",
            "body_html": "<p>Hello <b>there</b></p>"
        }))
        .unwrap();
        assert_eq!(message.content, "Hello there");
        assert_eq!(
            message
                .metadata
                .get(metadata_keys::ORIGINAL_HTML)
                .and_then(|v| v.as_str()),
            Some("<p>Hello <b>there</b></p>")
        );
    }

    #[test]
    fn test_attachments_mapped() {
        let message = normalize(&json!({
            "from": "a@b.com",
            "text": "see attached",
            "attachments": [
                {"id": "att1", "filename": "q.pdf", "mime_type": "application/pdf", "size": 1234}
            ]
        }))
        .unwrap();
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].filename, "q.pdf");
        assert_eq!(message.attachments[0].content_type, "application/pdf");
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(normalize(&json!("just a string")).is_err());
    }
}
