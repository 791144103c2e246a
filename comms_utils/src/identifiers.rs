/// Suffix WhatsApp appends to the bare phone number in its internal JIDs,
/// e.g. `27849977040@s.whatsapp.net`.
pub const WHATSAPP_SUFFIX: &str = "@s.whatsapp.net";

/// Domains used for personal mailboxes. A company record should never be
/// matched by one of these domains.
const PERSONAL_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "live.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "gmx.com",
    "mail.com",
    "yandex.com",
];

/// Lowercases and trims an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Strips everything that isn't a digit from a phone number. A leading `+`
/// carries no information once the country code digits are kept.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Splits a WhatsApp JID into its bare phone number, if the value carries the
/// WhatsApp suffix. `27849977040@s.whatsapp.net` -> `Some("27849977040")`.
pub fn split_whatsapp_id(value: &str) -> Option<String> {
    value
        .strip_suffix(WHATSAPP_SUFFIX)
        .map(|bare| normalize_phone(bare))
        .filter(|digits| !digits.is_empty())
}

/// Returns the domain part of an email address, lowercased.
pub fn email_domain(email: &str) -> Option<String> {
    let normalized = normalize_email(email);
    let (local, domain) = normalized.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

/// Whether a domain belongs to a personal email provider rather than a
/// company.
pub fn is_personal_email_domain(domain: &str) -> bool {
    let domain = domain.to_lowercase();
    PERSONAL_EMAIL_DOMAINS.iter().any(|d| *d == domain)
}
