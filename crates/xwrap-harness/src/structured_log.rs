//! Fatal-log schema validation.
//!
//! The default reporter emits one JSON object per fatal event (stderr in
//! `jsonl` format, and the `XWRAP_LOG_FILE` copy). This module checks those
//! lines against the record schema:
//! - required: `timestamp`, `pid`, `tid`, `op`, `kind`, `message`
//! - optional: `operand` (string), `errno` (integer)
//! - `kind` must be one of the failure taxonomy strings

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use xwrap_core::{FailureKind, FatalRecord};

pub const REQUIRED_FIELDS: [&str; 6] = ["timestamp", "pid", "tid", "op", "kind", "message"];

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("line {line_number}: field '{field}': {message}")]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl LogValidationError {
    fn new(line_number: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            line_number,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a single JSONL line.
///
/// Returns the parsed record, or every violation found on the line.
pub fn validate_fatal_line(
    line: &str,
    line_number: usize,
) -> Result<FatalRecord, Vec<LogValidationError>> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![LogValidationError::new(
                line_number,
                "<json>",
                format!("invalid JSON: {e}"),
            )]);
        }
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![LogValidationError::new(
            line_number,
            "<root>",
            "expected JSON object",
        )]);
    };

    let mut errors = Vec::new();
    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            errors.push(LogValidationError::new(
                line_number,
                field,
                "required field missing",
            ));
        }
    }

    if let Some(kind) = obj.get("kind") {
        match kind.as_str() {
            Some(s) if FailureKind::from_log_str(s).is_some() => {}
            Some(s) => errors.push(LogValidationError::new(
                line_number,
                "kind",
                format!("invalid kind: '{s}'"),
            )),
            None => errors.push(LogValidationError::new(
                line_number,
                "kind",
                "expected string",
            )),
        }
    }

    for field in ["timestamp", "op", "message"] {
        if obj.get(field).is_some_and(|v| !v.is_string()) {
            errors.push(LogValidationError::new(line_number, field, "expected string"));
        }
    }
    if obj.get("op").and_then(|v| v.as_str()) == Some("") {
        errors.push(LogValidationError::new(line_number, "op", "must not be empty"));
    }
    if let Some(operand) = obj.get("operand")
        && !operand.is_string()
    {
        errors.push(LogValidationError::new(line_number, "operand", "expected string"));
    }
    if let Some(errno) = obj.get("errno")
        && !errno.is_i64()
    {
        errors.push(LogValidationError::new(line_number, "errno", "expected integer"));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value(value).map_err(|e| {
        vec![LogValidationError::new(
            line_number,
            "<record>",
            format!("does not decode as a fatal record: {e}"),
        )]
    })
}

/// Result of validating a whole log.
#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    pub ok: bool,
    pub record_count: usize,
    pub ops: Vec<String>,
    pub violations: Vec<LogValidationError>,
}

/// Validate every non-blank line of a JSONL log.
#[must_use]
pub fn validate_fatal_log(contents: &str) -> LogReport {
    let mut ops = Vec::new();
    let mut violations = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match validate_fatal_line(line, idx + 1) {
            Ok(record) => ops.push(record.op),
            Err(mut errs) => violations.append(&mut errs),
        }
    }
    LogReport {
        ok: violations.is_empty(),
        record_count: ops.len(),
        ops,
        violations,
    }
}

/// Read and validate a JSONL log file.
pub fn validate_fatal_log_file(path: &Path) -> std::io::Result<LogReport> {
    let contents = std::fs::read_to_string(path)?;
    Ok(validate_fatal_log(&contents))
}
