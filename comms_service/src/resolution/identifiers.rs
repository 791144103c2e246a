//! Batch identifier extraction. One pass over a sync batch collects every
//! identity hint into per-namespace maps, so participant resolution costs
//! one database round-trip per batch instead of one per message.

use crate::ports::IdentifierBatch;
use models_comms::identifier::Identifier;
use models_comms::normalized::NormalizedMessage;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Metadata key holding the provider's own sender sub-document on
/// re-processed messages. Consulted as a fallback after the enriched
/// sender.
const PROVIDER_DATA: &str = "provider_data";

#[derive(Debug, Default)]
pub struct IdentifierMaps {
    pub email_to_name: HashMap<String, String>,
    pub phone_to_name: HashMap<String, String>,
    pub linkedin_to_name: HashMap<String, String>,
    pub provider_to_name: HashMap<String, String>,
}

impl IdentifierMaps {
    /// Records an identifier sighting. When the same identifier shows up
    /// with several candidate names, the longest non-empty one is kept as a
    /// proxy for "most complete".
    pub fn note(&mut self, identifier: &Identifier, name: &str) {
        let map = match identifier {
            Identifier::Email(_) => &mut self.email_to_name,
            Identifier::Phone(_) => &mut self.phone_to_name,
            Identifier::LinkedinUrn(_) => &mut self.linkedin_to_name,
            Identifier::ProviderId(_) => &mut self.provider_to_name,
        };

        let name = name.trim();
        let entry = map.entry(identifier.value().to_string()).or_default();
        if name.len() > entry.len() {
            *entry = name.to_string();
        }
    }

    /// Overrides collected names with a pre-fetched attendee directory.
    /// Directory names win over anything scraped from message bodies
    /// whenever they are present and non-empty.
    pub fn apply_attendee_names(&mut self, directory: &HashMap<String, String>) {
        for map in [
            &mut self.email_to_name,
            &mut self.phone_to_name,
            &mut self.linkedin_to_name,
            &mut self.provider_to_name,
        ] {
            for (identifier, name) in map.iter_mut() {
                if let Some(directory_name) = directory.get(identifier) {
                    if !directory_name.trim().is_empty() {
                        *name = directory_name.trim().to_string();
                    }
                }
            }
        }
    }

    pub fn to_batch(&self) -> IdentifierBatch {
        IdentifierBatch {
            emails: self.email_to_name.keys().cloned().collect(),
            phones: self.phone_to_name.keys().cloned().collect(),
            linkedin_urns: self.linkedin_to_name.keys().cloned().collect(),
            provider_ids: self.provider_to_name.keys().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email_to_name.is_empty()
            && self.phone_to_name.is_empty()
            && self.linkedin_to_name.is_empty()
            && self.provider_to_name.is_empty()
    }

    /// Iterates every (identifier, collected name) pair.
    pub fn iter(&self) -> impl Iterator<Item = (Identifier, &str)> {
        let emails = self
            .email_to_name
            .iter()
            .map(|(k, v)| (Identifier::Email(k.clone()), v.as_str()));
        let phones = self
            .phone_to_name
            .iter()
            .map(|(k, v)| (Identifier::Phone(k.clone()), v.as_str()));
        let urns = self
            .linkedin_to_name
            .iter()
            .map(|(k, v)| (Identifier::LinkedinUrn(k.clone()), v.as_str()));
        let providers = self
            .provider_to_name
            .iter()
            .map(|(k, v)| (Identifier::ProviderId(k.clone()), v.as_str()));
        emails.chain(phones).chain(urns).chain(providers)
    }
}

/// Collects every identity hint from a message batch.
pub fn extract_identifiers(messages: &[NormalizedMessage]) -> IdentifierMaps {
    let mut maps = IdentifierMaps::default();

    for message in messages {
        for identifier in sender_identifier_candidates(message) {
            maps.note(&identifier, &sender_name(message));
        }

        for recipient in message
            .to
            .iter()
            .chain(message.cc.iter())
            .chain(message.bcc.iter())
        {
            if let Some(identifier) = Identifier::email(&recipient.email) {
                maps.note(&identifier, &recipient.name);
            }
        }
    }

    maps
}

/// The priority-ordered identifier candidates for a message's sender. The
/// enriched sender comes first (phone, then URN, then platform id, then
/// email), then the provider's stored sender sub-document, then legacy
/// metadata fields. Lookup tries these in order; first cache hit wins.
pub fn sender_identifier_candidates(message: &NormalizedMessage) -> Vec<Identifier> {
    let mut candidates = Vec::new();
    let sender = &message.sender;

    if let Some(id) = Identifier::phone(&sender.phone) {
        candidates.push(id);
    }
    if !sender.linkedin_urn.is_empty() {
        candidates.push(Identifier::LinkedinUrn(sender.linkedin_urn.clone()));
    }
    if !sender.provider_id.is_empty() {
        if let Some(id) = Identifier::classify(&sender.provider_id) {
            candidates.push(id);
        }
    }
    if let Some(id) = Identifier::email(&sender.email) {
        candidates.push(id);
    }

    // stored sender sub-document, for re-processed messages
    if let Some(JsonValue::Object(stored)) = message
        .metadata
        .get(PROVIDER_DATA)
        .and_then(|v| v.get("sender"))
    {
        for key in ["phone", "linkedin_urn", "provider_id", "email"] {
            if let Some(value) = stored.get(key).and_then(|v| v.as_str()) {
                if let Some(id) = Identifier::classify(value) {
                    candidates.push(id);
                }
            }
        }
    }

    // legacy flat metadata fields
    if let Some(from) = message.metadata.get("from") {
        let raw = match from {
            JsonValue::Object(entry) => entry.get("email").and_then(|v| v.as_str()),
            JsonValue::String(s) => Some(s.as_str()),
            _ => None,
        };
        if let Some(id) = raw.and_then(Identifier::classify) {
            candidates.push(id);
        }
    }
    if let Some(provider_id) = message.metadata.get("provider_id").and_then(|v| v.as_str()) {
        if let Some(id) = Identifier::classify(provider_id) {
            candidates.push(id);
        }
    }

    candidates.dedup();
    candidates
}

/// The best sender display name the message itself offers.
pub fn sender_name(message: &NormalizedMessage) -> String {
    if !message.sender.name.is_empty() {
        return message.sender.name.clone();
    }

    if let Some(name) = message
        .metadata
        .get(PROVIDER_DATA)
        .and_then(|v| v.get("sender"))
        .and_then(|s| s.get("name"))
        .and_then(|v| v.as_str())
    {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }

    message
        .metadata
        .get("sender_name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use models_comms::channel::ChannelType;

    fn message_with_sender(
        email: &str,
        phone: &str,
        provider_id: &str,
        name: &str,
    ) -> NormalizedMessage {
        let mut message = NormalizedMessage::new(ChannelType::Generic);
        message.sender.email = email.to_string();
        message.sender.phone = phone.to_string();
        message.sender.provider_id = provider_id.to_string();
        message.sender.name = name.to_string();
        message
    }

    #[test]
    fn test_phone_precedes_email_in_candidates() {
        let message = message_with_sender("jane@acme.com", "27849977040", "", "Jane");
        let candidates = sender_identifier_candidates(&message);
        assert_eq!(candidates[0], Identifier::Phone("27849977040".to_string()));
        assert!(candidates.contains(&Identifier::Email("jane@acme.com".to_string())));
    }

    #[test]
    fn test_whatsapp_provider_id_reclassified_as_phone() {
        let message = message_with_sender("", "", "27849977040@s.whatsapp.net", "");
        let candidates = sender_identifier_candidates(&message);
        assert_eq!(candidates[0], Identifier::Phone("27849977040".to_string()));
    }

    #[test]
    fn test_longest_name_wins() {
        let mut maps = IdentifierMaps::default();
        let id = Identifier::Email("jane@acme.com".to_string());
        maps.note(&id, "Jane");
        maps.note(&id, "Jane Doe");
        maps.note(&id, "J");
        assert_eq!(maps.email_to_name["jane@acme.com"], "Jane Doe");
    }

    #[test]
    fn test_attendee_directory_overrides_collected_names() {
        let mut maps = IdentifierMaps::default();
        maps.note(&Identifier::Phone("555".to_string()), "fragment");

        let mut directory = HashMap::new();
        directory.insert("555".to_string(), "Robert Smith".to_string());
        maps.apply_attendee_names(&directory);

        assert_eq!(maps.phone_to_name["555"], "Robert Smith");
    }

    #[test]
    fn test_recipients_collected_by_email() {
        let mut message = message_with_sender("a@b.com", "", "", "");
        message.to.push(models_comms::normalized::NormalizedRecipient {
            email: "to@acme.com".to_string(),
            name: "To Person".to_string(),
        });
        message.cc.push(models_comms::normalized::NormalizedRecipient {
            email: "cc@acme.com".to_string(),
            name: String::new(),
        });

        let maps = extract_identifiers(std::slice::from_ref(&message));
        assert!(maps.email_to_name.contains_key("to@acme.com"));
        assert!(maps.email_to_name.contains_key("cc@acme.com"));
        assert_eq!(maps.email_to_name["to@acme.com"], "To Person");
    }
}
