use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

/// Second-precision UTC timestamp layout shared with SQLite's
/// `strftime('%Y-%m-%dT%H:%M:%SZ', ...)`, so stored values compare lexicographically.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// SQL expression producing the current time in the same layout as [`now_iso8601`].
pub const SQL_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Parse a timestamp previously produced by [`now_iso8601`].
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    time::PrimitiveDateTime::parse(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.assume_utc())
}
