use chrono::{NaiveDate, NaiveDateTime};

/// Formats the walker is known to emit for `LastWriteTime`, tried in order.
/// PowerShell renders dates with the server's US culture (month first).
pub const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a walker timestamp such as `"01/02/2024 10:00:00"` or
/// `"1/2/2024 10:00:00 AM"` into a naive local datetime.
///
/// A bare date (`"01/02/2024"` or `"2024-01-02"`) is accepted as midnight.
pub fn parse_last_write_time<S: AsRef<str>>(s: &str, formats: &[S]) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt.as_ref()) {
            return Some(dt);
        }
    }

    ["%m/%d/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
