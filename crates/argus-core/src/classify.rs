//! Failure classification.
//!
//! Every fetch outcome — an HTTP status or a raw error string — maps to a
//! [`Classification`] that tells the control plane whether a retry is worth
//! attempting. DNS and certificate failures are structural; transport drops,
//! 5xx, 408 and 429 are transient; unknown errors are retried optimistically
//! because the retry cap bounds the cost.

/// Classifier verdict for one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Worth another attempt.
    pub retryable: bool,
    /// Expected to clear on its own (transport blips, server overload).
    pub temporary: bool,
    /// Short human-readable phrase, used as the failure message.
    pub reason: String,
    /// Synthetic HTTP status for non-HTTP failures, pass-through otherwise.
    pub status: Option<u16>,
}

impl Classification {
    fn new(retryable: bool, temporary: bool, reason: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            retryable,
            temporary,
            reason: reason.into(),
            status,
        }
    }
}

/// Tagged failure input. Raw errors are parsed into one of these variants
/// before classification so new error kinds are testable additions to the
/// parse step, not new branches scattered through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureInput<'a> {
    HttpStatus(u16),
    /// Chromium-style `net::ERR_*` message.
    BrowserError(&'a str),
    /// POSIX-style error code (`ENOTFOUND`, `ECONNREFUSED`, ...).
    IoCode(&'a str),
    /// Error whose message names a timeout without a recognised tag.
    TimeoutLike,
    Unknown(&'a str),
}

/// Classify an HTTP response status.
pub fn classify_status(status: u16) -> Classification {
    match status {
        408 => Classification::new(true, true, "Request timeout", Some(status)),
        429 => Classification::new(true, true, "Too many requests", Some(status)),
        400 => Classification::new(false, false, "Bad request", Some(status)),
        401 => Classification::new(false, false, "Unauthorized", Some(status)),
        403 => Classification::new(false, false, "Forbidden", Some(status)),
        404 => Classification::new(false, false, "Not found", Some(status)),
        s if (400..500).contains(&s) => {
            Classification::new(false, false, format!("Client error {s}"), Some(status))
        }
        s if s >= 500 => {
            Classification::new(true, true, format!("Server error {s}"), Some(status))
        }
        s => Classification::new(false, false, format!("HTTP {s}"), Some(status)),
    }
}

/// Classify a raw error by message and optional code.
pub fn classify_error(message: &str, code: Option<&str>) -> Classification {
    classify(parse_failure(message, code))
}

/// Classify a tagged failure input.
pub fn classify(input: FailureInput<'_>) -> Classification {
    match input {
        FailureInput::HttpStatus(s) => classify_status(s),
        FailureInput::IoCode(code) => classify_io_code(code),
        FailureInput::BrowserError(message) => classify_browser(message),
        FailureInput::TimeoutLike => {
            Classification::new(true, true, "Navigation timeout", Some(408))
        }
        FailureInput::Unknown(message) => {
            // Optimistic default: the retry cap bounds the cost of being wrong.
            Classification::new(true, false, message, None)
        }
    }
}

/// Parse a raw error into a tagged [`FailureInput`].
pub fn parse_failure<'a>(message: &'a str, code: Option<&'a str>) -> FailureInput<'a> {
    if let Some(code) = code {
        if matches!(code, "ENOTFOUND" | "ECONNREFUSED" | "ECONNRESET" | "ETIMEDOUT") {
            return FailureInput::IoCode(code);
        }
    }
    if message.contains("ERR_") {
        return FailureInput::BrowserError(message);
    }
    let lower = message.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        return FailureInput::TimeoutLike;
    }
    FailureInput::Unknown(message)
}

fn classify_io_code(code: &str) -> Classification {
    match code {
        "ENOTFOUND" => Classification::new(false, false, "DNS resolution failed", None),
        "ECONNREFUSED" => Classification::new(true, true, "Connection refused", None),
        "ECONNRESET" => Classification::new(true, true, "Connection reset", None),
        "ETIMEDOUT" => Classification::new(true, true, "Connection timed out", None),
        other => Classification::new(true, false, other, None),
    }
}

fn classify_browser(message: &str) -> Classification {
    if message.contains("ERR_CONNECTION_REFUSED") {
        return Classification::new(true, true, "Connection refused", Some(503));
    }
    if message.contains("ERR_CONNECTION_TIMED_OUT") || message.contains("ERR_TIMED_OUT") {
        return Classification::new(true, true, "Connection timed out", Some(408));
    }
    if message.contains("ERR_NAME_NOT_RESOLVED") {
        return Classification::new(false, false, "DNS resolution failed", Some(404));
    }
    if message.contains("ERR_CERT_") {
        return Classification::new(false, false, "SSL certificate error", Some(502));
    }
    if message.contains("ERR_NETWORK_CHANGED") || message.contains("ERR_INTERNET_DISCONNECTED") {
        return Classification::new(true, true, "Network connection lost", Some(503));
    }
    // Any other Chromium network error: transient until proven otherwise.
    let tag = extract_err_tag(message).unwrap_or("ERR_UNKNOWN");
    Classification::new(true, true, format!("Browser network error ({tag})"), Some(503))
}

/// Pull the `ERR_*` token out of a Chromium error message.
fn extract_err_tag(message: &str) -> Option<&str> {
    let start = message.find("ERR_")?;
    let rest = &message[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
