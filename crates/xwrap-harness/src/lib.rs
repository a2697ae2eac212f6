//! Scenario harness for xwrap.
//!
//! This crate provides:
//! - Fatal-log validation: check reporter JSONL output against the record schema
//! - The `xwrap-harness` binary: drives each facade scenario in its own
//!   process so that fatal termination can be observed from outside

pub mod structured_log;

pub use structured_log::{LogReport, LogValidationError, validate_fatal_log};
