use comms_utils::{normalize_email, normalize_phone, split_whatsapp_id};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One identity hint for a person, in one of the four namespaces we resolve
/// across. The contained value is always normalized (lowercased email,
/// digits-only phone).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Email(String),
    Phone(String),
    LinkedinUrn(String),
    ProviderId(String),
}

impl Identifier {
    /// Classifies a bare string identifier the way providers mix them:
    /// a WhatsApp JID is a phone number with the suffix stripped, anything
    /// else containing `@` is an email, a leading `+` marks a phone number,
    /// and everything else is an opaque provider id.
    pub fn classify(raw: &str) -> Option<Identifier> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(phone) = split_whatsapp_id(raw) {
            return Some(Identifier::Phone(phone));
        }
        if raw.starts_with("urn:li:") {
            return Some(Identifier::LinkedinUrn(raw.to_string()));
        }
        if raw.contains('@') {
            return Some(Identifier::Email(normalize_email(raw)));
        }
        if raw.starts_with('+') {
            let digits = normalize_phone(raw);
            if digits.is_empty() {
                return None;
            }
            return Some(Identifier::Phone(digits));
        }
        Some(Identifier::ProviderId(raw.to_string()))
    }

    pub fn email(raw: &str) -> Option<Identifier> {
        let normalized = normalize_email(raw);
        if normalized.is_empty() {
            None
        } else {
            Some(Identifier::Email(normalized))
        }
    }

    pub fn phone(raw: &str) -> Option<Identifier> {
        let digits = normalize_phone(raw);
        if digits.is_empty() {
            None
        } else {
            Some(Identifier::Phone(digits))
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Email(v)
            | Identifier::Phone(v)
            | Identifier::LinkedinUrn(v)
            | Identifier::ProviderId(v) => v,
        }
    }
}

/// Cache keys are the identifier rendered with a namespace prefix, e.g.
/// `email:jane@acme.com`, `phone:27849977040`, `linkedin:urn:li:member:1`,
/// `provider:abc123`. One participant is indexed under every key that
/// applies to it.
impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Email(v) => write!(f, "email:{v}"),
            Identifier::Phone(v) => write!(f, "phone:{v}"),
            Identifier::LinkedinUrn(v) => write!(f, "linkedin:{v}"),
            Identifier::ProviderId(v) => write!(f, "provider:{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_whatsapp_jid_as_phone() {
        assert_eq!(
            Identifier::classify("27849977040@s.whatsapp.net"),
            Some(Identifier::Phone("27849977040".to_string()))
        );
    }

    #[test]
    fn test_classify_email() {
        assert_eq!(
            Identifier::classify("Jane.Doe@Acme.COM"),
            Some(Identifier::Email("jane.doe@acme.com".to_string()))
        );
    }

    #[test]
    fn test_classify_plus_prefix_as_phone() {
        assert_eq!(
            Identifier::classify("+27 84 997 7040"),
            Some(Identifier::Phone("27849977040".to_string()))
        );
    }

    #[test]
    fn test_classify_linkedin_urn() {
        assert_eq!(
            Identifier::classify("urn:li:member:12345"),
            Some(Identifier::LinkedinUrn("urn:li:member:12345".to_string()))
        );
    }

    #[test]
    fn test_classify_opaque_provider_id() {
        assert_eq!(
            Identifier::classify("ABCD-1234"),
            Some(Identifier::ProviderId("ABCD-1234".to_string()))
        );
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(Identifier::classify("  "), None);
    }

    #[test]
    fn test_cache_key_rendering() {
        assert_eq!(
            Identifier::Email("jane@acme.com".to_string()).to_string(),
            "email:jane@acme.com"
        );
        assert_eq!(
            Identifier::Phone("27849977040".to_string()).to_string(),
            "phone:27849977040"
        );
    }
}
