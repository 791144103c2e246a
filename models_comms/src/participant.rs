use crate::identifier::Identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use utoipa::ToSchema;
use uuid::Uuid;

/// How a participant's record link was established. Stored as a string so
/// new methods never need a migration.
pub mod resolution_method {
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
    pub const DOMAIN: &str = "domain";
    pub const MANUAL: &str = "manual";
}

/// Canonical identity for a person/account across channels. A participant
/// is only creatable from at least one identifier; rows with no identifier
/// at all are meaningless and must never be persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    pub id: Uuid,
    /// Normalized lowercase, empty when unknown.
    pub email: String,
    /// Digits only, empty when unknown.
    pub phone: String,
    pub linkedin_member_urn: String,
    pub instagram_username: String,
    pub facebook_id: String,
    pub telegram_id: String,
    pub twitter_handle: String,
    /// Display name. Empty string, never NULL, when unknown.
    pub name: String,
    /// Free-form; holds `provider_id` when resolved from a platform id.
    pub metadata: JsonValue,

    /// Primary linked CRM record.
    pub record_id: Option<Uuid>,
    pub resolution_confidence: f64,
    pub resolution_method: String,
    pub resolved_at: Option<DateTime<Utc>>,

    /// Secondary (e.g. company-by-domain) linked record.
    pub secondary_record_id: Option<Uuid>,
    pub secondary_confidence: f64,
    pub secondary_resolution_method: String,
    pub secondary_pipeline: String,

    pub total_conversations: i64,
    pub total_messages: i64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Builds a new participant from one identifier. This is the only
    /// construction path, which is what enforces the at-least-one-identifier
    /// invariant.
    pub fn from_identifier(identifier: &Identifier, name: &str) -> Participant {
        let now = Utc::now();
        let mut participant = Participant {
            id: Uuid::now_v7(),
            email: String::new(),
            phone: String::new(),
            linkedin_member_urn: String::new(),
            instagram_username: String::new(),
            facebook_id: String::new(),
            telegram_id: String::new(),
            twitter_handle: String::new(),
            name: name.to_string(),
            metadata: json!({}),
            record_id: None,
            resolution_confidence: 0.0,
            resolution_method: String::new(),
            resolved_at: None,
            secondary_record_id: None,
            secondary_confidence: 0.0,
            secondary_resolution_method: String::new(),
            secondary_pipeline: String::new(),
            total_conversations: 0,
            total_messages: 0,
            first_seen: Some(now),
            last_seen: Some(now),
            created_at: now,
            updated_at: now,
        };

        match identifier {
            Identifier::Email(email) => participant.email = email.clone(),
            Identifier::Phone(phone) => {
                participant.phone = phone.clone();
                participant.metadata = json!({ "provider_id": phone });
            }
            Identifier::LinkedinUrn(urn) => {
                participant.linkedin_member_urn = urn.clone();
                participant.metadata = json!({ "provider_id": urn });
            }
            Identifier::ProviderId(id) => {
                participant.metadata = json!({ "provider_id": id });
            }
        }

        participant
    }

    /// Whether any identifier namespace is populated.
    pub fn has_any_identifier(&self) -> bool {
        !self.email.is_empty()
            || !self.phone.is_empty()
            || !self.linkedin_member_urn.is_empty()
            || self.provider_id().is_some()
    }

    /// The platform-internal id stamped into metadata at creation, if any.
    pub fn provider_id(&self) -> Option<&str> {
        self.metadata
            .get("provider_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Every identifier this participant can be cached under.
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut keys = Vec::new();
        if !self.email.is_empty() {
            keys.push(Identifier::Email(self.email.clone()));
        }
        if !self.phone.is_empty() {
            keys.push(Identifier::Phone(self.phone.clone()));
        }
        if !self.linkedin_member_urn.is_empty() {
            keys.push(Identifier::LinkedinUrn(self.linkedin_member_urn.clone()));
        }
        if let Some(provider_id) = self.provider_id() {
            keys.push(Identifier::ProviderId(provider_id.to_string()));
        }
        keys
    }

    pub fn has_record_match(&self) -> bool {
        self.record_id.is_some() || self.secondary_record_id.is_some()
    }
}

/// Whether a candidate display name is an upgrade over the stored one.
///
/// A name is replaced when the stored one is empty, is just the raw
/// identifier echoed back, looks like an email address while the candidate
/// doesn't, or the candidate is strictly longer (a proxy for "more
/// complete"). A shorter candidate never regresses a stored name.
pub fn is_name_upgrade(current: &str, candidate: &str, identifier: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate == current {
        return false;
    }
    if current.is_empty() || current == identifier {
        return true;
    }
    if current.contains('@') && !candidate.contains('@') {
        return true;
    }
    candidate.len() > current.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_identifier_email() {
        let p = Participant::from_identifier(
            &Identifier::Email("jane@acme.com".to_string()),
            "Jane Doe",
        );
        assert_eq!(p.email, "jane@acme.com");
        assert_eq!(p.name, "Jane Doe");
        assert!(p.has_any_identifier());
        assert!(p.first_seen.is_some());
    }

    #[test]
    fn test_from_identifier_phone_stamps_provider_id() {
        let p = Participant::from_identifier(&Identifier::Phone("27849977040".to_string()), "");
        assert_eq!(p.phone, "27849977040");
        assert_eq!(p.provider_id(), Some("27849977040"));
        // name is empty string, never null
        assert_eq!(p.name, "");
    }

    #[test]
    fn test_identifiers_multi_key() {
        let mut p = Participant::from_identifier(
            &Identifier::Email("jane@acme.com".to_string()),
            "Jane",
        );
        p.phone = "555123".to_string();
        let keys = p.identifiers();
        assert!(keys.contains(&Identifier::Email("jane@acme.com".to_string())));
        assert!(keys.contains(&Identifier::Phone("555123".to_string())));
    }

    #[test]
    fn test_name_upgrade_monotonicity() {
        // "" -> "Jane Doe" upgrades
        assert!(is_name_upgrade("", "Jane Doe", "jane@acme.com"));
        // "Jane Doe" -> "J" never regresses
        assert!(!is_name_upgrade("Jane Doe", "J", "jane@acme.com"));
        // identifier echo is replaceable
        assert!(is_name_upgrade("jane@acme.com", "Jane", "jane@acme.com"));
        // email-looking name loses to a real name
        assert!(is_name_upgrade("j.doe@acme.com", "Jane", "other@acme.com"));
        // equal candidate is a no-op
        assert!(!is_name_upgrade("Jane", "Jane", "jane@acme.com"));
    }
}
