use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::process::date_parser::DEFAULT_TIMESTAMP_FORMATS;

/// Prefix of every environment override, e.g. `SERVER_FILES_REPORT_DIR`.
pub const ENV_PREFIX: &str = "SERVER_FILES_";
/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "SERVER_FILES_CONFIG";

/// Run settings. Every field has a production default, so an empty YAML
/// file (or none at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Executable that runs the walker script.
    pub walker_program: String,
    /// Script passed as the walker's only argument.
    pub walker_script: PathBuf,
    pub log_dir: PathBuf,
    /// Log files are named `<log_app_name>-<MM-DD-YYYY>.txt`.
    pub log_app_name: String,
    pub report_dir: PathBuf,
    /// Reports are named `<report_name>-<MonthName><Year>.csv`.
    pub report_name: String,
    /// Literal prefix stripped from owners, e.g. `CORP\`.
    pub domain_prefix: String,
    /// Drive the walker enumerates; directory paths are anchored on it.
    pub root_drive: String,
    /// `LastWriteTime` formats, tried in order.
    pub timestamp_formats: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            walker_program: "powershell.exe".into(),
            walker_script: PathBuf::from(
                r"F:\Alteryx\server-files-report\powershell\02BackUp-fs-stats.ps1",
            ),
            log_dir: PathBuf::from(r"F:\Alteryx\server-files-report\python\logs"),
            log_app_name: "server-files-app-log".into(),
            report_dir: PathBuf::from(r"F:\Alteryx\server-files-report\alteryx\input"),
            report_name: "alteryx-server-files-results".into(),
            domain_prefix: r"DOMAIN\".into(),
            root_drive: "F:".into(),
            timestamp_formats: DEFAULT_TIMESTAMP_FORMATS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load from `path` if given, else from `$SERVER_FILES_CONFIG` if set,
    /// else defaults; then apply `SERVER_FILES_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut cfg = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| env::var(format!("{ENV_PREFIX}{key}")).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override fields from a `KEY -> value` lookup (keys without the prefix).
    /// `TIMESTAMP_FORMATS` is a `;`-separated list.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WALKER_PROGRAM") {
            self.walker_program = v;
        }
        if let Some(v) = lookup("WALKER_SCRIPT") {
            self.walker_script = v.into();
        }
        if let Some(v) = lookup("LOG_DIR") {
            self.log_dir = v.into();
        }
        if let Some(v) = lookup("LOG_APP_NAME") {
            self.log_app_name = v;
        }
        if let Some(v) = lookup("REPORT_DIR") {
            self.report_dir = v.into();
        }
        if let Some(v) = lookup("REPORT_NAME") {
            self.report_name = v;
        }
        if let Some(v) = lookup("DOMAIN_PREFIX") {
            self.domain_prefix = v;
        }
        if let Some(v) = lookup("ROOT_DRIVE") {
            self.root_drive = v;
        }
        if let Some(v) = lookup("TIMESTAMP_FORMATS") {
            self.timestamp_formats = v
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
}
