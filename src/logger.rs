use anyhow::{anyhow, Context};
use log::warn;
use simplelog::*;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOG_FILE_NAME: &str = "terms_gate.log";

pub fn init(config: &crate::config::Config) -> anyhow::Result<()> {
    let dirs = config.log_dirs();
    let (log_dir, log_file) = open_log_file(&dirs)?;

    WriteLogger::init(parse_level(&config.logging.level), Config::default(), log_file)?;

    if dirs.first() != Some(&log_dir) {
        warn!("Configured log directory is not writable; logging to {:?}", log_dir);
    }
    Ok(())
}

/// Opens `terms_gate.log` in the first directory that can hold it.
pub fn open_log_file(dirs: &[PathBuf]) -> anyhow::Result<(PathBuf, File)> {
    let mut failures = Vec::new();
    for dir in dirs {
        match open_in(dir) {
            Ok(file) => return Ok((dir.clone(), file)),
            Err(e) => failures.push(format!("{:?}: {:#}", dir, e)),
        }
    }
    Err(anyhow!("no writable log directory ({})", failures.join("; ")))
}

fn open_in(dir: &Path) -> anyhow::Result<File> {
    std::fs::create_dir_all(dir).context("create log directory")?;

    // Every scheduled run appends to the same file.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
        .context("open log file")
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
