use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parses the timestamp formats providers actually send: RFC 3339 / ISO-8601
/// (with `Z` or an offset), Unix epoch seconds or milliseconds (numeric or a
/// numeric string), and the bare `%Y-%m-%d %H:%M:%S` shape some webhook
/// payloads use. Returns `None` for anything unparsable so the caller can
/// fall back to ingestion time.
pub fn parse_provider_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(epoch) = raw.parse::<i64>() {
        return parse_epoch(epoch);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    None
}

/// Epoch values above this are treated as milliseconds. The cutoff is
/// year 5138 in seconds and 2001 in milliseconds, so real traffic is
/// unambiguous.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

fn parse_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch <= 0 {
        return None;
    }
    if epoch >= EPOCH_MILLIS_CUTOFF {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

/// Numeric payload fields arrive as either integers or floats depending on
/// the provider's JSON encoder.
pub fn parse_epoch_number(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() || epoch <= 0.0 {
        return None;
    }
    parse_epoch(epoch as i64)
}
