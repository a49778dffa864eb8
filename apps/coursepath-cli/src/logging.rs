//! Logging initialization and log file management.
//!
//! Provides dual-output tracing: stderr (human-readable) and an optional
//! JSON log file at `<data_dir>/logs/<session>/<timestamp>.log`, so each
//! conversation keeps its own log history.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// File-layer directives used when `RUST_LOG` is unset.
const DEFAULT_FILE_FILTER: &str = "warn,coursepath_core=debug,coursepath_cli=info";

/// Initialize the tracing subscriber with stderr output.
///
/// When `session` is `Some`, an additional JSON file layer is added
/// that writes to `logs/<session>/<timestamp>.log` under `data_dir`.
///
/// Returns an optional [`WorkerGuard`] that must be held for the
/// lifetime of the program to ensure all buffered logs are flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the
/// log file cannot be opened.
pub fn init_tracing(data_dir: &Path, session: Option<&str>) -> Result<Option<WorkerGuard>> {
    let guard = build_tracing(data_dir, session)?;

    if let Some((subscriber, guard)) = guard {
        subscriber.init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        Ok(None)
    }
}

/// Build the tracing subscriber layers without registering globally.
///
/// Returns `Some((subscriber, guard))` when a session is provided
/// (dual-layer), or `None` when only stderr logging is needed.
fn build_tracing(
    data_dir: &Path,
    session: Option<&str>,
) -> Result<Option<(impl tracing::Subscriber + Send + Sync, WorkerGuard)>> {
    let Some(session) = session else {
        return Ok(None);
    };

    let (non_blocking, guard) = open_log_writer(data_dir, session)?;

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(file_filter()),
        );

    Ok(Some((subscriber, guard)))
}

/// `RUST_LOG` when set, else [`DEFAULT_FILE_FILTER`], so session logs keep
/// the pipeline's decisions even when stderr stays quiet.
fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_FILTER))
}

/// Create the log directory and file, returning a non-blocking writer and guard.
///
/// The log path is `logs/<session>/<YYYYMMDD_HHMMSS>.log`; parent
/// directories are created and the file is wrapped in a non-blocking writer
/// via `tracing_appender`.
fn open_log_writer(
    data_dir: &Path,
    session: &str,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(data_dir, session);

    let log_dir = log_path.parent().context(format!(
        "failed to resolve parent directory for log path: {}",
        log_path.display(),
    ))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// Remove log files older than [`LOG_RETENTION_DAYS`] from `<data_dir>/logs/`,
/// then any session directories left empty.
///
/// Best-effort: failures are reported with `eprintln!` since tracing is not
/// initialized yet.
pub fn cleanup_old_logs(data_dir: &Path) {
    let logs_dir = data_dir.join("logs");
    let Ok(sessions) = fs::read_dir(&logs_dir) else {
        return;
    };
    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    for session_dir in sessions.filter_map(|e| e.ok()).map(|e| e.path()) {
        if !session_dir.is_dir() {
            continue;
        }
        remove_old_log_files(&session_dir, cutoff);
        // Fails while the directory still holds files.
        let _ = fs::remove_dir(&session_dir);
    }
}

/// Remove `.log` files in `dir` last modified before `cutoff`.
fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: failed to read log directory {}: {e}", dir.display());
            return;
        }
    };

    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let is_old = fs::metadata(&path)
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < cutoff);
        if is_old && let Err(e) = fs::remove_file(&path) {
            eprintln!("warning: failed to remove old log file {}: {e}", path.display());
        }
    }
}

/// Build the log file path: `logs/<session>/<YYYYMMDD_HHMMSS>.log`.
fn build_log_path(data_dir: &Path, session: &str) -> PathBuf {
    let timestamp = format_utc_timestamp(SystemTime::now());
    data_dir
        .join("logs")
        .join(session)
        .join(format!("{timestamp}.log"))
}

/// Format a [`SystemTime`] as `YYYYMMDD_HHMMSS` in UTC.
fn format_utc_timestamp(time: SystemTime) -> String {
    let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let (year, month, day) = days_to_date(secs / 86_400);
    let (hours, minutes, seconds) = (secs % 86_400 / 3600, secs % 3600 / 60, secs % 60);
    format!("{year:04}{month:02}{day:02}_{hours:02}{minutes:02}{seconds:02}")
}

/// Civil (year, month, day) for a day count since the Unix epoch.
///
/// Counts from 0000-03-01 so the leap day falls at the end of each year.
fn days_to_date(days_since_epoch: u64) -> (u64, u64, u64) {
    let z = days_since_epoch as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097) as u64;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_index + 2) / 5 + 1;
    let month = if month_index < 10 { month_index + 3 } else { month_index - 9 };
    let year = year_of_era as i64 + era * 400 + i64::from(month <= 2);
    (year as u64, month, day)
}
