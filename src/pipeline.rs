use chrono::NaiveDateTime;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::PipelineError,
    process::{derive::FieldDeriver, parse::parse_and_report, raw_table::RawTable},
    report::write_report,
    walker::{replay_lines, LineSource, WalkerProcess},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub anomalies: usize,
    pub report: PathBuf,
}

/// Spawn the configured walker, or replay a captured output file instead.
pub fn open_source(config: &Config, replay: Option<&Path>) -> Result<LineSource, PipelineError> {
    match replay {
        Some(path) => replay_lines(path).map(LineSource::Replay),
        None => WalkerProcess::spawn(&config.walker_program, &config.walker_script)
            .map(LineSource::Process),
    }
}

/// Parse, tabulate, derive and write one report from `lines`.
///
/// `now` is captured once by the caller and drives both file ages and the
/// report's month.
pub fn run<I>(config: &Config, lines: I, now: NaiveDateTime) -> Result<RunSummary, PipelineError>
where
    I: IntoIterator<Item = io::Result<Vec<u8>>>,
{
    // ─── 1) parse walker output ──────────────────────────────────────
    let outcome = parse_and_report(lines);

    // ─── 2) tabulate + derive ────────────────────────────────────────
    info!("formatting walker results into tabular format");
    let table = RawTable::from_records(&outcome.records);
    if table.is_empty() {
        warn!("walker produced no complete records; report will only have a header");
    }
    let deriver = FieldDeriver::new(
        now,
        &config.domain_prefix,
        &config.root_drive,
        config.timestamp_formats.as_slice(),
    )?;
    let rows = deriver.derive_all(&table)?;
    info!(
        rows = rows.len(),
        columns = table.headers.len(),
        "formatted walker results"
    );

    // ─── 3) write report ─────────────────────────────────────────────
    info!(dir = %config.report_dir.display(), "writing formatted results");
    let report = write_report(&config.report_dir, &config.report_name, now, &rows)?;

    Ok(RunSummary {
        rows: rows.len(),
        anomalies: outcome.anomalies.len(),
        report,
    })
}
