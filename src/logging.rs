use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Line timestamps use the same local clock that dates the file name.
fn local_timer() -> ChronoLocal {
    ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string())
}

/// `<app_name>-<MM-DD-YYYY>.txt` inside `dir`.
pub fn log_file_path(dir: &Path, app_name: &str, today: NaiveDateTime) -> PathBuf {
    dir.join(format!("{}-{}.txt", app_name, today.format("%m-%d-%Y")))
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// Install the global subscriber: the dated log file plus stderr.
/// Filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init(dir: &Path, app_name: &str, today: NaiveDateTime) -> Result<PathBuf> {
    let path = log_file_path(dir, app_name, today);
    let file = open_append(&path)?;

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_timer(local_timer())
                .with_writer(Mutex::new(file)),
        )
        .with(
            fmt::layer()
                .with_timer(local_timer())
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(path)
}
