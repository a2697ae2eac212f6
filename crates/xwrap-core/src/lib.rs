//! # xwrap-core
//!
//! Fail-fast wrappers around libc system calls.
//!
//! Functions with the `x` prefix forward to the call they wrap and either
//! return its success value or terminate the process after reporting the
//! failure. They never return an error.
//!
//! # Architecture
//!
//! ```text
//! caller -> x* facade -> checked layer (raw call, sentinel -> Result/Step)
//!                            | Ok  -> value back to caller
//!                            | Err -> report::die -> reporter -> _exit/abort
//! ```
//!
//! The reporter and termination mode are configured through `XWRAP_*`
//! environment variables (see [`config`]) or programmatically, and an
//! application can install its own [`DiagnosticReporter`].

mod checked;
pub mod config;
pub mod errno;
pub mod error;
mod fdpass;
pub mod report;
pub mod sockaddr;
pub mod xwrap;

pub use config::{LogFormat, ReporterConfig, TerminationMode};
pub use error::{FailureKind, SyscallError};
pub use report::{DiagnosticReporter, FatalRecord, OrDie, StderrReporter, die};
pub use sockaddr::SockAddr;
pub use xwrap::*;
