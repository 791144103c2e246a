use once_cell::sync::Lazy;
use regex::Regex;

/// Checks if an email address is likely a generic/automated system email.
///
/// Automated senders carry display names like "Acme Notifications" that must
/// never be attached to a participant as a person's name.
pub fn is_generic_email(email: &str) -> bool {
    let email_lower = email.to_lowercase();

    let automated_prefixes = [
        "reply",
        "noreply",
        "no-reply",
        "no_reply",
        "do-not-reply",
        "do_not_reply",
        "donotreply",
        "auto",
        "automated",
        "alert",
        "alerts",
        "notification",
        "notifications",
        "info",
        "news",
        "newsletter",
        "updates",
        "support",
        "help",
        "helpdesk",
        "service",
        "services",
        "system",
        "admin",
        "administrator",
        "account",
        "accounts",
        "billing",
        "mailer",
        "mailer-daemon",
        "postmaster",
        "robot",
        "bot",
        "confirm",
        "confirmation",
        "verify",
        "verification",
        "security",
        "webmaster",
        "feedback",
        "marketing",
        "sales",
        "receipts",
        "orders",
        "shipping",
        "tracking",
    ];

    for prefix in automated_prefixes {
        if email_lower.starts_with(prefix)
            && (email_lower.contains(&format!("{}@", prefix))
                || email_lower.contains(&format!("{}-", prefix))
                || email_lower.contains(&format!("{}.", prefix))
                || email_lower.contains(&format!("{}+", prefix))
                || email_lower.contains(&format!("{}_", prefix)))
        {
            return true;
        }
    }

    false
}

/// Removes service suffixes from a display name and normalizes spaces.
///
/// Detects and removes:
/// 1. Suffixes in the format " (via ServiceName)"
/// 2. Suffixes in the format " via ServiceName"
/// 3. Known provider suffixes like " (LinkedIn)" and " (WhatsApp)"
pub fn clean_display_name(name: &str) -> String {
    static VIA_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r" via [^()]+$").unwrap());
    static VIA_PARENS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r" \(via [^()]+\)$").unwrap());
    static PROVIDER_SUFFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r" \((LinkedIn|WhatsApp|Telegram|Instagram|Facebook|X)\)$").unwrap()
    });

    // Non-breaking spaces (U+00A0) show up in provider-rendered names
    let name = name.replace('\u{00A0}', " ");

    let name = VIA_PATTERN.replace(&name, "").to_string();
    let name = VIA_PARENS_PATTERN.replace(&name, "").to_string();

    PROVIDER_SUFFIX_PATTERN
        .replace(&name, "")
        .trim()
        .to_string()
}
