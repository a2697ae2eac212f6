//! Diagnostic reporter and the non-returning fatal path.
//!
//! Every facade failure ends up in [`die`]: the failure is turned into a
//! [`FatalRecord`], handed to the installed [`DiagnosticReporter`] (or the
//! default [`StderrReporter`]), and the process is then terminated according
//! to the active [`ReporterConfig`]. A reporter cannot veto termination.

use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{self, LogFormat, ReporterConfig, TerminationMode};
use crate::error::{FailureKind, SyscallError};

/// Structured form of one fatal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalRecord {
    pub timestamp: String,
    pub pid: u32,
    pub tid: i32,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    pub kind: FailureKind,
    pub message: String,
}

impl FatalRecord {
    /// Capture a failure together with the identity of the failing thread.
    #[must_use]
    pub fn from_error(err: &SyscallError) -> Self {
        Self {
            timestamp: now_utc(),
            pid: std::process::id(),
            tid: current_tid(),
            op: err.op().to_string(),
            operand: err.operand().map(str::to_string),
            errno: err.errno(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Human-readable line, `"<tag>: <message>"`.
    #[must_use]
    pub fn to_text(&self, tag: &str) -> String {
        format!("{tag}: {}", self.message)
    }
}

/// Receives fatal records just before the process terminates.
///
/// Implementations should write the record somewhere durable and return;
/// the caller terminates the process afterwards regardless of what the
/// reporter does.
pub trait DiagnosticReporter: Send + Sync {
    fn report(&self, record: &FatalRecord);
}

/// Default reporter: one line on stderr, optional JSONL copy to a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrReporter;

impl StderrReporter {
    /// Emit `record` using an explicit configuration.
    pub fn report_with(&self, record: &FatalRecord, config: &ReporterConfig) {
        let jsonl = record.to_jsonl().ok();
        let line = match (config.format, jsonl.as_deref()) {
            (LogFormat::Jsonl, Some(json)) => json.to_string(),
            _ => record.to_text(&config.tag),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
        let _ = stderr.flush();

        if let (Some(path), Some(json)) = (config.log_file.as_deref(), jsonl.as_deref()) {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{json}");
            }
        }
    }
}

impl DiagnosticReporter for StderrReporter {
    fn report(&self, record: &FatalRecord) {
        self.report_with(record, &config::reporter_config());
    }
}

static REPORTER: RwLock<Option<Arc<dyn DiagnosticReporter>>> = RwLock::new(None);

thread_local! {
    static DYING: Cell<bool> = const { Cell::new(false) };
}

/// Install an application reporter in place of [`StderrReporter`].
pub fn set_reporter(reporter: Box<dyn DiagnosticReporter>) {
    *REPORTER.write() = Some(Arc::from(reporter));
}

/// Restore the default reporter.
pub fn reset_reporter() {
    *REPORTER.write() = None;
}

/// Report `err` and terminate the process. Never returns.
///
/// A failure raised while a reporter is already running on this thread
/// skips reporting and terminates immediately.
#[cold]
#[inline(never)]
pub fn die(err: SyscallError) -> ! {
    let config = config::reporter_config();
    if !DYING.replace(true) {
        let record = FatalRecord::from_error(&err);
        let _ = panic::catch_unwind(AssertUnwindSafe(|| deliver(&record, &config)));
    }
    terminate(&config)
}

// The lock is released before the reporter runs, so a reporter may
// install or remove reporters without blocking the fatal path.
fn deliver(record: &FatalRecord, config: &ReporterConfig) {
    let installed = REPORTER.read_recursive().clone();
    match installed {
        Some(reporter) => reporter.report(record),
        None => StderrReporter.report_with(record, config),
    }
}

fn terminate(config: &ReporterConfig) -> ! {
    match config.termination {
        TerminationMode::Abort => std::process::abort(),
        TerminationMode::Exit => {
            let _ = std::io::stderr().flush();
            // SAFETY: _exit has no preconditions and does not return.
            unsafe { libc::_exit(config.exit_code) }
        }
    }
}

/// Unwrap a checked result or take the fatal path.
pub trait OrDie<T> {
    fn or_die(self) -> T;
}

impl<T> OrDie<T> for Result<T, SyscallError> {
    #[inline]
    fn or_die(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => die(err),
        }
    }
}

fn current_tid() -> i32 {
    // SAFETY: gettid has no preconditions.
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

// Days since 1970-01-01 to proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
