use chrono::{NaiveDateTime, TimeDelta};
use regex::Regex;
use tracing::{debug, instrument};

use crate::{
    error::FormatError,
    process::{date_parser::parse_last_write_time, raw_table::RawTable},
};

const BYTES_PER_UNIT: f64 = 1024.0;

/// A walker record with the reporting columns computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRow {
    pub index: usize,
    /// `Owner` with the domain prefix removed.
    pub owner: Option<String>,
    pub file_name: Option<String>,
    pub file_age_days: i64,
    pub bytes_b: u64,
    pub kilobytes_kb: f64,
    pub megabytes_mb: f64,
    pub gigabytes_gb: f64,
    pub last_write_datetime: NaiveDateTime,
    pub dir_path: Option<String>,
    pub full_path: Option<String>,
}

pub struct FieldDeriver {
    now: NaiveDateTime,
    domain_prefix: String,
    dir_pattern: Regex,
    timestamp_formats: Vec<String>,
}

impl FieldDeriver {
    /// `now` is the single reference instant for every row's age.
    /// `root` is the drive the walker enumerates, e.g. `F:`.
    pub fn new<S: AsRef<str>>(
        now: NaiveDateTime,
        domain_prefix: &str,
        root: &str,
        timestamp_formats: &[S],
    ) -> Result<Self, FormatError> {
        let pattern = format!(r"^{}\\.+\\", regex::escape(root));
        let dir_pattern = Regex::new(&pattern).map_err(|source| FormatError::Pattern {
            root: root.to_string(),
            source,
        })?;
        Ok(Self {
            now,
            domain_prefix: domain_prefix.to_string(),
            dir_pattern,
            timestamp_formats: timestamp_formats
                .iter()
                .map(|f| f.as_ref().to_string())
                .collect(),
        })
    }

    /// Strip the domain prefix from the start of an owner, if present.
    pub fn owner_name<'a>(&self, owner: &'a str) -> &'a str {
        if self.domain_prefix.is_empty() {
            return owner;
        }
        owner.strip_prefix(self.domain_prefix.as_str()).unwrap_or(owner)
    }

    /// Leading `<root>\...\` of a full path, up to the last backslash.
    pub fn dir_path<'a>(&self, full_name: &'a str) -> Option<&'a str> {
        self.dir_pattern.find(full_name).map(|m| m.as_str())
    }

    /// Whole days between `last_write` and `now`, rounded towards negative infinity.
    pub fn age_days(&self, last_write: NaiveDateTime) -> i64 {
        floor_days(self.now - last_write)
    }

    /// Compute every derived column. Fails on the first row whose timestamp
    /// or size cannot be read; a bad `FullName` only nulls that row's paths.
    #[instrument(level = "info", skip_all, fields(rows = table.len()))]
    pub fn derive_all(&self, table: &RawTable) -> Result<Vec<DerivedRow>, FormatError> {
        let last_write = table.column("LastWriteTime");
        let full_name = table.column("FullName");
        let name = table.column("Name");
        let length = table.column("Length");
        let owner = table.column("Owner");

        let mut out = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let lw_raw = table
                .get(row, last_write)
                .ok_or(FormatError::MissingField {
                    row,
                    field: "LastWriteTime",
                })?;
            let formats = self.timestamp_formats.as_slice();
            let last_write_datetime =
                parse_last_write_time(lw_raw, formats).ok_or_else(|| FormatError::Timestamp {
                    row,
                    value: lw_raw.to_string(),
                })?;

            let len_raw = table.get(row, length).ok_or(FormatError::MissingField {
                row,
                field: "Length",
            })?;
            let bytes_b = parse_byte_count(len_raw).ok_or_else(|| FormatError::Size {
                row,
                value: len_raw.to_string(),
            })?;
            let kilobytes_kb = bytes_b as f64 / BYTES_PER_UNIT;
            let megabytes_mb = kilobytes_kb / BYTES_PER_UNIT;
            let gigabytes_gb = megabytes_mb / BYTES_PER_UNIT;

            let file_name = table.get(row, name).map(str::to_string);
            let dir_path = table
                .get(row, full_name)
                .and_then(|f| self.dir_path(f))
                .map(str::to_string);
            if dir_path.is_none() {
                debug!(row, full_name = ?table.get(row, full_name), "no directory path");
            }
            let full_path = match (&dir_path, &file_name) {
                (Some(d), Some(n)) => Some(format!("{d}{n}")),
                _ => None,
            };

            out.push(DerivedRow {
                index: row,
                owner: table
                    .get(row, owner)
                    .map(|o| self.owner_name(o).to_string()),
                file_name,
                file_age_days: self.age_days(last_write_datetime),
                bytes_b,
                kilobytes_kb,
                megabytes_mb,
                gigabytes_gb,
                last_write_datetime,
                dir_path,
                full_path,
            });
        }
        Ok(out)
    }
}

/// Byte count from `Length`. Besides plain integers, accepts numeric forms
/// such as `2048.0` or `1e3` as long as they name a whole, non-negative count.
pub fn parse_byte_count(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if let Ok(n) = s.parse::<u64>() {
        return Some(n);
    }
    let f: f64 = s.parse().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

fn floor_days(delta: TimeDelta) -> i64 {
    let days = delta.num_days();
    if delta < TimeDelta::days(days) {
        days - 1
    } else {
        days
    }
}
