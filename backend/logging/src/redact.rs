//! Log Redaction Layer
//!
//! Scrubs access tokens and API keys from strings prior to logging. Chat
//! platform send APIs carry their credential in the query string, and
//! transport errors echo the full URL back.

use regex::Regex;
use std::sync::LazyLock;

static QUERY_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(access_token|api_key|apikey|appid|key|token)=[^&\s)]+").unwrap()
});
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = QUERY_SECRET_RE.replace_all(input, "$1=[REDACTED]");
    BEARER_RE
        .replace_all(&redacted, "Bearer [REDACTED_TOKEN]")
        .into_owned()
}
