//! Completion journal
//!
//! Appends a timestamp line to a per-day log file and repoints a `latest`
//! alias at the current day's log so operators can tail one stable path.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Record a completed rotation for `service` at `when`.
///
/// Returns the path of the day's log file.
pub fn record_completion(
    dir: &Path,
    service: &str,
    when: DateTime<Utc>,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let log_path = dir.join(format!("{}_{}.log", service, when.format("%Y%m%d")));

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    writeln!(
        file,
        "{} {} certificate rotation completed",
        when.to_rfc3339(),
        service
    )?;

    refresh_latest_alias(dir, &log_path)?;
    debug!(log = %log_path.display(), "recorded completion");
    Ok(log_path)
}

#[cfg(unix)]
fn refresh_latest_alias(dir: &Path, log_path: &Path) -> io::Result<()> {
    let alias = dir.join("latest");
    match fs::symlink_metadata(&alias) {
        Ok(_) => fs::remove_file(&alias)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    // Relative target keeps the alias valid if the directory moves.
    let target = log_path.file_name().unwrap_or(log_path.as_os_str());
    std::os::unix::fs::symlink(target, &alias)
}

#[cfg(not(unix))]
fn refresh_latest_alias(_dir: &Path, _log_path: &Path) -> io::Result<()> {
    Ok(())
}
