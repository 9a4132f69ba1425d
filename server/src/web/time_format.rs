use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Select the timezone for formatting timestamps in an API response: the timezone requested by
/// the client, if it is a valid IANA timezone name, otherwise the configured default timezone,
/// otherwise UTC.
pub fn resolve_timezone(requested: Option<&str>, default_timezone: &str) -> Tz {
    requested
        .and_then(|name| name.parse::<Tz>().ok())
        .or_else(|| default_timezone.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

pub fn format_timestamp(timestamp: &DateTime<Utc>, timezone: &Tz) -> String {
    timestamp
        .with_timezone(timezone)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}
