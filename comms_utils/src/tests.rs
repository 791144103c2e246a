use super::*;
use chrono::{Datelike, Timelike};

#[test]
fn test_normalize_email() {
    assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    assert_eq!(normalize_email("x@y.z"), "x@y.z");
}

#[test]
fn test_normalize_phone_strips_non_digits() {
    assert_eq!(normalize_phone("+27 84 997-7040"), "27849977040");
    assert_eq!(normalize_phone("(555) 123 4567"), "5551234567");
    assert_eq!(normalize_phone("no digits"), "");
}

#[test]
fn test_split_whatsapp_id() {
    assert_eq!(
        split_whatsapp_id("27849977040@s.whatsapp.net"),
        Some("27849977040".to_string())
    );
    // not a whatsapp jid
    assert_eq!(split_whatsapp_id("jane@example.com"), None);
    // suffix with no digits in front
    assert_eq!(split_whatsapp_id("@s.whatsapp.net"), None);
}

#[test]
fn test_email_domain() {
    assert_eq!(email_domain("Jane@Acme.COM"), Some("acme.com".to_string()));
    assert_eq!(email_domain("not-an-email"), None);
    assert_eq!(email_domain("@acme.com"), None);
}

#[test]
fn test_is_personal_email_domain() {
    assert!(is_personal_email_domain("gmail.com"));
    assert!(is_personal_email_domain("Outlook.com"));
    assert!(!is_personal_email_domain("acme.com"));
}

#[test]
fn test_is_generic_email() {
    assert!(is_generic_email("noreply@github.com"));
    assert!(is_generic_email("no-reply@linkedin.com"));
    assert!(is_generic_email("notifications@slack.com"));
    assert!(is_generic_email("support-team@acme.com"));
    assert!(!is_generic_email("jane.doe@acme.com"));
    // contains an automated word, but not as the local-part prefix
    assert!(!is_generic_email("jane.support@acme.com"));
}

#[test]
fn test_clean_display_name() {
    assert_eq!(clean_display_name("Jane Doe via LinkedIn"), "Jane Doe");
    assert_eq!(clean_display_name("Jane Doe (via WhatsApp)"), "Jane Doe");
    assert_eq!(clean_display_name("Jane Doe (LinkedIn)"), "Jane Doe");
    assert_eq!(clean_display_name("Plain Name"), "Plain Name");

    let with_nbsp = format!("Jane{}Doe via Teams", '\u{00A0}');
    assert_eq!(clean_display_name(&with_nbsp), "Jane Doe");
}

#[test]
fn test_parse_provider_timestamp_iso8601() {
    let ts = parse_provider_timestamp("2024-01-01T10:00:00Z").unwrap();
    assert_eq!((ts.year(), ts.month(), ts.day(), ts.hour()), (2024, 1, 1, 10));

    let with_offset = parse_provider_timestamp("2024-01-01T12:00:00+02:00").unwrap();
    assert_eq!(with_offset.hour(), 10);
}

#[test]
fn test_parse_provider_timestamp_epoch() {
    // seconds
    let ts = parse_provider_timestamp("1704103200").unwrap();
    assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 1));

    // milliseconds
    let ts = parse_provider_timestamp("1704103200000").unwrap();
    assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 1));
}

#[test]
fn test_parse_provider_timestamp_naive() {
    let ts = parse_provider_timestamp("2024-01-01 10:00:00").unwrap();
    assert_eq!(ts.hour(), 10);
}

#[test]
fn test_parse_provider_timestamp_unparsable() {
    assert!(parse_provider_timestamp("tomorrow").is_none());
    assert!(parse_provider_timestamp("").is_none());
    assert!(parse_provider_timestamp("-5").is_none());
}
