//! Error-code mapping shared by store errors and their callers.
//!
//! Callers (HTTP handlers, the admin CLI) turn store failures into transport
//! responses. `ErrorCode` gives them a stable machine-readable code and a
//! retry hint without matching on every variant themselves.

pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
