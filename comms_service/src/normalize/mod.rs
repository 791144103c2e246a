//! Per-channel normalization of raw provider payloads into the canonical
//! [`NormalizedMessage`] shape. Strategies only ever parse; everything a
//! strategy cannot know (direction, defaults, stamps) is applied in
//! [`finalize`], and the raw payload is always retained under
//! `metadata.channel_specific_data` so normalization is never lossy.

pub mod email;
pub mod generic;
pub mod html;
pub mod linkedin;
pub mod messaging;
pub mod social;
pub mod whatsapp;

use chrono::{DateTime, Utc};
use comms_utils::{normalize_email, normalize_phone, parse_epoch_number, parse_provider_timestamp};
use models_comms::channel::ChannelType;
use models_comms::message::{metadata_keys, MessageDirection, MessageStatus};
use models_comms::normalized::{
    AccountContext, NormalizationError, NormalizedMessage, NormalizedRecipient,
};
use serde_json::{Map, Value as JsonValue};

pub const NORMALIZER_VERSION: &str = "2.0";

/// Metadata marker a strategy sets when the payload itself states the
/// direction (e.g. WhatsApp's `from_me`). Without it, direction is decided
/// by comparing the sender identity against the connected account's own.
pub(crate) const DIRECTION_FROM_PROVIDER: &str = "direction_from_provider";

/// Normalizes one raw payload for a channel. Errors describe malformed
/// payloads; callers convert them into synthetic FAILED messages rather
/// than aborting ingestion.
#[tracing::instrument(skip(raw, account), level = "debug")]
pub fn normalize(
    raw: &JsonValue,
    channel_type: ChannelType,
    account: &AccountContext,
) -> Result<NormalizedMessage, NormalizationError> {
    let mut message = match channel_type {
        ChannelType::Email => email::normalize(raw)?,
        ChannelType::Whatsapp => whatsapp::normalize(raw)?,
        ChannelType::Linkedin => linkedin::normalize(raw)?,
        ChannelType::Social => social::normalize(raw)?,
        ChannelType::Messaging => messaging::normalize(raw)?,
        ChannelType::Generic => generic::normalize(raw)?,
    };

    finalize(&mut message, raw, account);
    Ok(message)
}

/// Post-processing common to every channel strategy.
fn finalize(message: &mut NormalizedMessage, raw: &JsonValue, account: &AccountContext) {
    message.sender.email = normalize_email(&message.sender.email);
    message.sender.phone = normalize_phone(&message.sender.phone);
    message.sender.name = message.sender.name.trim().to_string();
    message.subject = message.subject.trim().to_string();
    message.content = message.content.trim().to_string();

    for recipient in message
        .to
        .iter_mut()
        .chain(message.cc.iter_mut())
        .chain(message.bcc.iter_mut())
    {
        recipient.email = normalize_email(&recipient.email);
        recipient.name = recipient.name.trim().to_string();
    }

    // sent_at defaults to ingestion time so ordering always has a value
    if message.sent_at.is_none() {
        message.sent_at = Some(message.created_at);
    }

    let provider_stated_direction = message
        .metadata
        .get(DIRECTION_FROM_PROVIDER)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if !provider_stated_direction {
        // a message whose sender is the connected account itself is
        // outbound; an absent sender identity defaults to inbound
        message.direction = if !message.sender.is_empty() && account.owns_sender(&message.sender) {
            MessageDirection::Outbound
        } else {
            MessageDirection::Inbound
        };
    }

    if message.status != MessageStatus::Failed {
        message.status = match message.direction {
            MessageDirection::Outbound => MessageStatus::Sent,
            MessageDirection::Inbound => MessageStatus::Delivered,
        };
    }

    // providers without threading still need a stable thread key; fall back
    // to the sender identity so each contact maps to one conversation
    if message.external_thread_id.is_empty() {
        message.external_thread_id = if !message.sender.phone.is_empty() {
            message.sender.phone.clone()
        } else if !message.sender.email.is_empty() {
            message.sender.email.clone()
        } else if !message.sender.provider_id.is_empty() {
            message.sender.provider_id.clone()
        } else {
            message.external_message_id.clone()
        };
    }

    // a tracking id echoed back by the provider is the highest-priority
    // dedup key; surface it where the dedup layer looks
    if !message.metadata.contains_key(metadata_keys::TRACKING_ID) {
        if let Some(tracking_id) = raw
            .get(metadata_keys::TRACKING_ID)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            message.metadata.insert(
                metadata_keys::TRACKING_ID.to_string(),
                JsonValue::String(tracking_id.to_string()),
            );
        }
    }

    message.metadata.insert(
        metadata_keys::CHANNEL_SPECIFIC_DATA.to_string(),
        raw.clone(),
    );
    message.metadata.insert(
        metadata_keys::NORMALIZED_AT.to_string(),
        JsonValue::String(Utc::now().to_rfc3339()),
    );
    message.metadata.insert(
        metadata_keys::NORMALIZER_VERSION.to_string(),
        JsonValue::String(NORMALIZER_VERSION.to_string()),
    );
}

// --- shared payload helpers ---

pub(crate) fn as_object(raw: &JsonValue) -> Result<&Map<String, JsonValue>, NormalizationError> {
    raw.as_object().ok_or(NormalizationError::NotAnObject)
}

/// First non-empty string value among the given keys.
pub(crate) fn str_at<'a>(obj: &'a Map<String, JsonValue>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// First parsable timestamp among the given keys; strings and epoch
/// numbers both occur in the wild.
pub(crate) fn timestamp_at(
    obj: &Map<String, JsonValue>,
    keys: &[&str],
) -> Option<DateTime<Utc>> {
    keys.iter().filter_map(|key| obj.get(*key)).find_map(|v| {
        if let Some(s) = v.as_str() {
            parse_provider_timestamp(s)
        } else if let Some(n) = v.as_f64() {
            parse_epoch_number(n)
        } else {
            None
        }
    })
}

/// Parses one recipient entry: either a `{email, name}` object or a bare
/// string (plain address or `"Name <addr>"` header form).
pub(crate) fn parse_address_entry(value: &JsonValue) -> Option<NormalizedRecipient> {
    match value {
        JsonValue::Object(entry) => {
            let email = str_at(entry, &["email", "email_address", "address"])?;
            Some(NormalizedRecipient {
                email: email.to_string(),
                name: str_at(entry, &["name", "display_name"])
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        JsonValue::String(s) => parse_address_header(s).into_iter().next().map(
            |(name, addr)| NormalizedRecipient {
                email: addr,
                name: name.unwrap_or_default(),
            },
        ),
        _ => None,
    }
}

/// A recipient list field: an array of entries, or a single header string
/// carrying a comma-separated address list.
pub(crate) fn recipients_at(
    obj: &Map<String, JsonValue>,
    key: &str,
) -> Vec<NormalizedRecipient> {
    match obj.get(key) {
        Some(JsonValue::Array(entries)) => {
            entries.iter().filter_map(parse_address_entry).collect()
        }
        Some(JsonValue::String(header)) => parse_address_header(header)
            .into_iter()
            .map(|(name, addr)| NormalizedRecipient {
                email: addr,
                name: name.unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Parses an RFC 5322 address header into (display name, address) pairs.
pub(crate) fn parse_address_header(header_value: &str) -> Vec<(Option<String>, String)> {
    let header_value = header_value.trim();
    if header_value.is_empty() {
        return Vec::new();
    }

    match mailparse::addrparse(header_value) {
        Ok(addrs) => {
            let mut results = Vec::new();
            for addr in addrs.iter() {
                match addr {
                    mailparse::MailAddr::Single(info) => {
                        results.push((info.display_name.clone(), info.addr.clone()));
                    }
                    mailparse::MailAddr::Group(info) => {
                        for single in info.addrs.iter() {
                            results.push((single.display_name.clone(), single.addr.clone()));
                        }
                    }
                }
            }
            results
        }
        Err(_) if header_value.contains('@') && !header_value.contains('<') => {
            // a bare address the header parser rejects (no display name,
            // unusual characters); keep it rather than drop the identity
            vec![(None, header_value.to_string())]
        }
        Err(e) => {
            tracing::warn!(error = %e, header = header_value, "Failed to parse address header");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_address_header_forms() {
        let result = parse_address_header("Jane Doe <jane@acme.com>");
        assert_eq!(
            result,
            vec![(Some("Jane Doe".to_string()), "jane@acme.com".to_string())]
        );

        let result = parse_address_header("a@b.com, Carol <c@d.com>");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].1, "a@b.com");
        assert_eq!(result[1].0, Some("Carol".to_string()));

        assert!(parse_address_header("").is_empty());
    }

    #[test]
    fn test_direction_against_account_identity() {
        let account = AccountContext {
            account_id: "acc_1".to_string(),
            account_email: "me@acme.com".to_string(),
            ..Default::default()
        };

        let inbound = normalize(
            &json!({"from": "them@other.com", "text": "hello"}),
            ChannelType::Email,
            &account,
        )
        .unwrap();
        assert_eq!(inbound.direction, MessageDirection::Inbound);

        let outbound = normalize(
            &json!({"from": "me@acme.com", "to": ["them@other.com"], "text": "hi"}),
            ChannelType::Email,
            &account,
        )
        .unwrap();
        assert_eq!(outbound.direction, MessageDirection::Outbound);
    }

    #[test]
    fn test_finalize_stamps_and_raw_retention() {
        let raw = json!({"from": "x@y.com", "text": "hello", "custom_key": 7});
        let message = normalize(&raw, ChannelType::Email, &AccountContext::default()).unwrap();

        assert_eq!(
            message.metadata.get(metadata_keys::CHANNEL_SPECIFIC_DATA),
            Some(&raw)
        );
        assert!(message.metadata.contains_key(metadata_keys::NORMALIZED_AT));
        assert_eq!(
            message
                .metadata
                .get(metadata_keys::NORMALIZER_VERSION)
                .and_then(|v| v.as_str()),
            Some(NORMALIZER_VERSION)
        );
        assert!(message.sent_at.is_some());
    }

    #[test]
    fn test_thread_key_falls_back_to_sender() {
        let message = normalize(
            &json!({"from": "27849977040@s.whatsapp.net", "text": "hi"}),
            ChannelType::Whatsapp,
            &AccountContext::default(),
        )
        .unwrap();
        assert_eq!(message.external_thread_id, "27849977040");
    }
}
