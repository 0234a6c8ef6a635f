use anyhow::{bail, Context, Result};
use chrono::Local;
use server_files_report::{config::Config, logging, pipeline};
use std::{env, path::PathBuf, process::ExitCode};
use tracing::{error, info};

const USAGE: &str = "usage: server-files-report [--config <FILE>] [--replay <FILE>]";

/// Exit status for anything that fails before the pipeline starts.
const SETUP_FAILURE: u8 = 1;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    replay: Option<PathBuf>,
    help: bool,
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Args> {
    let mut out = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => out.config = Some(args.next().context("--config needs a path")?.into()),
            "--replay" => out.replay = Some(args.next().context("--replay needs a path")?.into()),
            "-h" | "--help" => out.help = true,
            other => bail!("unexpected argument {other:?}"),
        }
    }
    Ok(out)
}

fn main() -> ExitCode {
    // ─── 1) capture run time once: file ages, log name and report month ──
    let now = Local::now().naive_local();

    let args = match parse_args(env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e:#}\n{USAGE}");
            return ExitCode::from(SETUP_FAILURE);
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    // ─── 2) config + logging ─────────────────────────────────────────
    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(SETUP_FAILURE);
        }
    };
    match logging::init(&config.log_dir, &config.log_app_name, now) {
        Ok(path) => info!(log = %path.display(), "startup"),
        Err(e) => {
            eprintln!("logging setup failed: {e:#}");
            return ExitCode::from(SETUP_FAILURE);
        }
    }

    std::panic::set_hook(Box::new(|info| {
        error!("panic: {}", info);
    }));

    // ─── 3) walker output → report ───────────────────────────────────
    let result = pipeline::open_source(&config, args.replay.as_deref())
        .and_then(|source| pipeline::run(&config, source, now));

    match result {
        Ok(summary) => {
            info!(
                rows = summary.rows,
                anomalies = summary.anomalies,
                report = %summary.report.display(),
                "successfully finished, exiting normally"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
