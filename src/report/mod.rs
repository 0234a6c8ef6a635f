use chrono::NaiveDateTime;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::{error::PipelineError, process::derive::DerivedRow};

/// Header row of the report, in output order.
pub const REPORT_COLUMNS: [&str; 11] = [
    "INDEX",
    "OWNER",
    "FILE_NAME",
    "FILE_AGE_DAYS",
    "BYTES_B",
    "KILOBYTES_KB",
    "MEGABYTES_MB",
    "GIGABYTES_GB",
    "LAST_WRITE_DATETIME",
    "DIR_PATH",
    "FULL_PATH",
];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `<report_name>-<MonthName><Year>.csv`, e.g. `files-January2024.csv`.
pub fn report_file_name(report_name: &str, now: NaiveDateTime) -> String {
    format!("{}-{}.csv", report_name, now.format("%B%Y"))
}

/// Shortest representation that reads back to the same value; whole numbers keep `.0`.
fn format_float(v: f64) -> String {
    format!("{:?}", v)
}

fn to_record(row: &DerivedRow) -> [String; 11] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        row.index.to_string(),
        opt(&row.owner),
        opt(&row.file_name),
        row.file_age_days.to_string(),
        row.bytes_b.to_string(),
        format_float(row.kilobytes_kb),
        format_float(row.megabytes_mb),
        format_float(row.gigabytes_gb),
        row.last_write_datetime.format(DATETIME_FORMAT).to_string(),
        opt(&row.dir_path),
        opt(&row.full_path),
    ]
}

/// Serialize rows as CSV with the report header.
pub fn write_rows<W: Write>(rows: &[DerivedRow], w: W) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(REPORT_COLUMNS)?;
    for row in rows {
        wtr.write_record(to_record(row))?;
    }
    wtr.flush()
}

/// Write the monthly report into `dir`, replacing any earlier run from the same month.
///
/// Rows go to a temporary file beside the destination first, so a failed
/// write never leaves a truncated report. `dir` must already exist.
#[instrument(level = "info", skip(rows, now), fields(rows = rows.len()))]
pub fn write_report(
    dir: &Path,
    report_name: &str,
    now: NaiveDateTime,
    rows: &[DerivedRow],
) -> Result<PathBuf, PipelineError> {
    let path = dir.join(report_file_name(report_name, now));
    let write_err = |source: io::Error| PipelineError::Write {
        path: path.clone(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".report-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    write_rows(rows, tmp.as_file_mut()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;

    info!(path = %path.display(), "wrote report");
    Ok(path)
}
