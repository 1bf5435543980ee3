//! Maps raw failures onto the [`AiErrorKind`] taxonomy.

use crate::error_code::{AiError, AiErrorKind};
use crate::Error;

const AUTH: &[&str] = &["api key", "authentication", "unauthorized"];
const RATE: &[&str] = &["rate limit", "rate_limit", "too many requests"];
const TIMEOUT: &[&str] = &["timeout", "timed out", "etimedout"];
const QUOTA: &[&str] = &["quota", "insufficient credits", "insufficient balance"];
const NETWORK: &[&str] = &[
    "network",
    "econnreset",
    "enotfound",
    "enetunreach",
    "econnrefused",
    "connection refused",
    "connection reset",
    "error sending request",
];
const PARSE: &[&str] = &["json", "parse", "invalid response"];

/// Classifies a crate error.
///
/// Timeouts and parse failures raised by this crate map directly; everything
/// else goes through [`classify_message`] with the error's status code.
pub fn classify(err: &Error) -> AiError {
    let message = err.raw_message();
    let direct = match err {
        Error::Timeout { .. } => Some(AiErrorKind::Timeout),
        Error::Parse { .. } | Error::Serialization(_) => Some(AiErrorKind::ParseError),
        Error::Transport(e) if e.is_timeout() => Some(AiErrorKind::Timeout),
        Error::Transport(e) if e.is_connect() => Some(AiErrorKind::NetworkError),
        _ => None,
    };
    match direct {
        Some(kind) => AiError::new(kind, message, err.status_code().or(kind.default_status())),
        None => classify_message(&message, err.status_code()),
    }
}

/// Classifies a raw message plus optional HTTP-like status.
///
/// A recognized status wins; otherwise the lower-cased message is matched
/// against known substrings in a fixed order.
pub fn classify_message(message: &str, status: Option<u16>) -> AiError {
    let lower = message.to_lowercase();
    let kind = status
        .and_then(|s| match AiErrorKind::from_http_status(s) {
            Some(AiErrorKind::RateLimited) if contains_any(&lower, QUOTA) => {
                Some(AiErrorKind::QuotaExceeded)
            }
            other => other,
        })
        .unwrap_or_else(|| kind_from_message(&lower));
    AiError::new(kind, message, status.or(kind.default_status()))
}

fn kind_from_message(lower: &str) -> AiErrorKind {
    let table: [(&[&str], AiErrorKind); 6] = [
        (AUTH, AiErrorKind::AuthInvalid),
        (RATE, AiErrorKind::RateLimited),
        (TIMEOUT, AiErrorKind::Timeout),
        (QUOTA, AiErrorKind::QuotaExceeded),
        (NETWORK, AiErrorKind::NetworkError),
        (PARSE, AiErrorKind::ParseError),
    ];
    table
        .iter()
        .find(|(needles, _)| contains_any(lower, needles))
        .map(|(_, kind)| *kind)
        .unwrap_or(AiErrorKind::Unknown)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Whether a classified failure may be replaced with a rule-based result.
pub fn should_fallback(err: &AiError) -> bool {
    err.kind.fallbackable()
}
