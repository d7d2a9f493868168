//! Shared error conventions.
//!
//! Every service error enum implements [`ErrorCode`] so log lines carry a
//! grepable code and callers can decide whether a failure is worth retrying.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
