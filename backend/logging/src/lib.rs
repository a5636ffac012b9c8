//! Structured logging for apibot.
//!
//! Console output, optional NDJSON file rotation, and secret redaction for
//! values that end up in log lines (request URLs, transport errors).

pub mod logger;
pub mod redact;

pub use logger::{init_logger, LogGuard};
pub use redact::redact_sensitive_data;
