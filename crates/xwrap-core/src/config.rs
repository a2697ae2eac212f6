//! Fatal-path configuration.
//!
//! Resolved from the environment on first use and cached for the life of
//! the process:
//! - `XWRAP_LOG_FORMAT`: `text` (default) or `jsonl`.
//! - `XWRAP_ON_FATAL`: `exit` (default) terminates with `_exit(code)`;
//!   `abort` raises `SIGABRT` so a core dump is produced.
//! - `XWRAP_EXIT_CODE`: exit status for `exit`, 1..=255, default 1.
//! - `XWRAP_LOG_FILE`: if set, every fatal record is also appended there
//!   as one JSONL line.
//! - `XWRAP_TAG`: prefix of text-format diagnostics, default `xwrap`.

use std::path::PathBuf;

use parking_lot::RwLock;

pub const ENV_LOG_FORMAT: &str = "XWRAP_LOG_FORMAT";
pub const ENV_ON_FATAL: &str = "XWRAP_ON_FATAL";
pub const ENV_EXIT_CODE: &str = "XWRAP_EXIT_CODE";
pub const ENV_LOG_FILE: &str = "XWRAP_LOG_FILE";
pub const ENV_TAG: &str = "XWRAP_TAG";

const DEFAULT_EXIT_CODE: i32 = 1;
const DEFAULT_TAG: &str = "xwrap";

/// Line format of the default stderr reporter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFormat {
    /// `"<tag>: <op>: <operand>: <cause>"`.
    #[default]
    Text,
    /// One serialized fatal record per line.
    Jsonl,
}

impl LogFormat {
    /// Parse from string (case-insensitive). Unknown values fall back to text.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json" | "structured" => Self::Jsonl,
            _ => Self::Text,
        }
    }
}

/// How the process ends once the diagnostic has been emitted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationMode {
    /// `_exit(exit_code)`: no unwinding, no atexit handlers.
    #[default]
    Exit,
    /// `abort()`: terminates with `SIGABRT`.
    Abort,
}

impl TerminationMode {
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "abort" | "core" | "sigabrt" => Self::Abort,
            _ => Self::Exit,
        }
    }
}

/// Resolved reporter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    pub format: LogFormat,
    pub termination: TerminationMode,
    pub exit_code: i32,
    pub log_file: Option<PathBuf>,
    pub tag: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            termination: TerminationMode::default(),
            exit_code: DEFAULT_EXIT_CODE,
            log_file: None,
            tag: DEFAULT_TAG.to_string(),
        }
    }
}

impl ReporterConfig {
    /// Resolve from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            format: lookup(ENV_LOG_FORMAT)
                .map(|v| LogFormat::from_str_loose(&v))
                .unwrap_or(defaults.format),
            termination: lookup(ENV_ON_FATAL)
                .map(|v| TerminationMode::from_str_loose(&v))
                .unwrap_or(defaults.termination),
            exit_code: lookup(ENV_EXIT_CODE)
                .and_then(|v| parse_exit_code(&v))
                .unwrap_or(defaults.exit_code),
            log_file: lookup(ENV_LOG_FILE)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            tag: lookup(ENV_TAG)
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.tag),
        }
    }
}

// Zero would read as success to the parent.
fn parse_exit_code(raw: &str) -> Option<i32> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|code| (1..=255).contains(code))
}

static CONFIG: RwLock<Option<ReporterConfig>> = RwLock::new(None);

/// Get the active configuration (reads the environment on first call,
/// caches thereafter).
#[must_use]
pub fn reporter_config() -> ReporterConfig {
    if let Some(config) = CONFIG.read_recursive().as_ref() {
        return config.clone();
    }
    let mut slot = CONFIG.write();
    slot.get_or_insert_with(ReporterConfig::from_env).clone()
}

/// Replace the active configuration.
pub fn set_reporter_config(config: ReporterConfig) {
    *CONFIG.write() = Some(config);
}

/// Drop the cached configuration so the next read consults the environment.
pub fn reset_reporter_config() {
    *CONFIG.write() = None;
}
