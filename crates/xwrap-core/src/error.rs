//! Structured failure context handed to the diagnostic reporter.
//!
//! A [`SyscallError`] never crosses the facade boundary as a return value.
//! It exists so the reporter can name the failed operation, its operand,
//! and the underlying cause before the process goes away.

use std::ffi::CStr;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conceptual failure taxonomy. Every kind is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The OS could not provide the requested file, socket, or memory.
    ResourceUnavailable,
    /// An exact-size transfer moved fewer bytes than required.
    ShortTransfer,
    /// A permission or security-policy check refused the call.
    PolicyDenied,
}

impl FailureKind {
    /// Stable string form used in structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResourceUnavailable => "resource_unavailable",
            Self::ShortTransfer => "short_transfer",
            Self::PolicyDenied => "policy_denied",
        }
    }

    /// Parse the structured-log string form.
    #[must_use]
    pub fn from_log_str(s: &str) -> Option<Self> {
        match s {
            "resource_unavailable" => Some(Self::ResourceUnavailable),
            "short_transfer" => Some(Self::ShortTransfer),
            "policy_denied" => Some(Self::PolicyDenied),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a wrapped call failed.
#[derive(Debug, Error)]
pub enum SyscallError {
    /// The call reported failure through its sentinel and `errno`.
    #[error("{op}: {}{source}", OperandPrefix(.operand.as_deref()))]
    Os {
        op: &'static str,
        operand: Option<String>,
        #[source]
        source: io::Error,
    },
    /// An exact-size transfer completed without an OS error but moved the
    /// wrong number of bytes.
    #[error("{op}: short transfer ({actual} of {expected} bytes)")]
    ShortTransfer {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A received message carried no descriptor in its control data.
    #[error("{op}: no descriptor in ancillary data")]
    MissingAncillary { op: &'static str },
}

struct OperandPrefix<'a>(Option<&'a str>);

impl fmt::Display for OperandPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(operand) => write!(f, "{operand}: "),
            None => Ok(()),
        }
    }
}

impl SyscallError {
    /// Capture the calling thread's last OS error for `op`.
    ///
    /// Must be called immediately after the failing call, before anything
    /// else can overwrite `errno`.
    #[must_use]
    pub fn last_os(op: &'static str) -> Self {
        Self::Os {
            op,
            operand: None,
            source: io::Error::last_os_error(),
        }
    }

    /// Build an OS failure from an explicit errno value.
    #[must_use]
    pub fn from_errno(op: &'static str, errno: i32) -> Self {
        Self::Os {
            op,
            operand: None,
            source: io::Error::from_raw_os_error(errno),
        }
    }

    /// Wrap an `io::Error` produced by a std call.
    #[must_use]
    pub fn from_io(op: &'static str, source: io::Error) -> Self {
        Self::Os {
            op,
            operand: None,
            source,
        }
    }

    /// Attach the distinguishing operand (pathname, context string, size).
    ///
    /// Only OS failures carry an operand; other variants are returned as-is.
    #[must_use]
    pub fn with_operand(self, operand: impl Into<String>) -> Self {
        match self {
            Self::Os { op, source, .. } => Self::Os {
                op,
                operand: Some(operand.into()),
                source,
            },
            other => other,
        }
    }

    /// Attach a C string operand, replacing invalid UTF-8 lossily.
    #[must_use]
    pub fn with_c_operand(self, operand: &CStr) -> Self {
        self.with_operand(operand.to_string_lossy())
    }

    /// Short operation tag, e.g. `"open"` or `"connect"`.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Os { op, .. } | Self::ShortTransfer { op, .. } | Self::MissingAncillary { op } => {
                *op
            }
        }
    }

    /// Operand included in the diagnostic, if any.
    #[must_use]
    pub fn operand(&self) -> Option<&str> {
        match self {
            Self::Os { operand, .. } => operand.as_deref(),
            _ => None,
        }
    }

    /// Raw errno of an OS failure.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Os { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Classify into the failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ShortTransfer { .. } => FailureKind::ShortTransfer,
            Self::Os { source, .. } => match source.raw_os_error() {
                Some(libc::EACCES | libc::EPERM) => FailureKind::PolicyDenied,
                _ => FailureKind::ResourceUnavailable,
            },
            Self::MissingAncillary { .. } => FailureKind::ResourceUnavailable,
        }
    }
}
