//! AI failure taxonomy.
//!
//! Every upstream failure is mapped onto one of seven kinds. The kind fixes
//! two flags that drive the rest of the reliability layer:
//!
//! | Kind             | Retryable | Fallback |
//! |------------------|-----------|----------|
//! | `AuthInvalid`    | no        | no       |
//! | `RateLimited`    | yes       | yes      |
//! | `Timeout`        | yes       | yes      |
//! | `QuotaExceeded`  | no        | no       |
//! | `NetworkError`   | yes       | yes      |
//! | `ParseError`     | no        | yes      |
//! | `Unknown`        | no        | no       |
//!
//! ## Example
//!
//! ```rust
//! use newslens_ai::error_code::AiErrorKind;
//!
//! let kind = AiErrorKind::from_http_status(429).unwrap();
//! assert_eq!(kind, AiErrorKind::RateLimited);
//! assert!(kind.retryable());
//! assert!(kind.fallbackable());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiErrorKind {
    /// Invalid, expired, or missing API key
    AuthInvalid,
    /// Request rate limit exceeded
    RateLimited,
    /// Request timed out before a response was received
    Timeout,
    /// Account usage quota or credits exhausted
    QuotaExceeded,
    /// Transport failure or provider-side server error
    NetworkError,
    /// Response could not be parsed into the expected shape
    ParseError,
    /// Error could not be classified
    Unknown,
}

impl AiErrorKind {
    /// Returns the standard name (e.g., `"rate_limited"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthInvalid => "auth_invalid",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::QuotaExceeded => "quota_exceeded",
            Self::NetworkError => "network_error",
            Self::ParseError => "parse_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the retry handler may attempt the call again.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::NetworkError)
    }

    /// Whether a rule-based substitute may be served instead.
    ///
    /// Authentication and quota failures are configuration problems and must surface.
    #[inline]
    pub fn fallbackable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::NetworkError | Self::ParseError
        )
    }

    /// Status code reported for a message-classified error without one.
    pub fn default_status(&self) -> Option<u16> {
        match self {
            Self::AuthInvalid => Some(401),
            Self::RateLimited | Self::QuotaExceeded => Some(429),
            Self::Timeout => Some(408),
            Self::NetworkError => Some(503),
            Self::ParseError => Some(500),
            Self::Unknown => None,
        }
    }

    /// Maps an HTTP status code to a kind, when the status is decisive.
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(Self::AuthInvalid),
            402 => Some(Self::QuotaExceeded),
            408 => Some(Self::Timeout),
            429 => Some(Self::RateLimited),
            s if s >= 500 => Some(Self::NetworkError),
            _ => None,
        }
    }
}

impl fmt::Display for AiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified failure. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiError {
    pub kind: AiErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl AiError {
    pub fn new(kind: AiErrorKind, message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.retryable(),
            status_code,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_flags_fixed_by_kind() {
        assert!(AiErrorKind::RateLimited.retryable());
        assert!(AiErrorKind::Timeout.retryable());
        assert!(AiErrorKind::NetworkError.retryable());
        assert!(!AiErrorKind::AuthInvalid.retryable());
        assert!(!AiErrorKind::QuotaExceeded.retryable());
        assert!(!AiErrorKind::ParseError.retryable());
        assert!(!AiErrorKind::Unknown.retryable());
    }

    #[test]
    fn test_parse_error_falls_back_but_is_not_retried() {
        let kind = AiErrorKind::ParseError;
        assert!(kind.fallbackable());
        assert!(!kind.retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AiErrorKind::from_http_status(401), Some(AiErrorKind::AuthInvalid));
        assert_eq!(AiErrorKind::from_http_status(429), Some(AiErrorKind::RateLimited));
        assert_eq!(AiErrorKind::from_http_status(502), Some(AiErrorKind::NetworkError));
        assert_eq!(AiErrorKind::from_http_status(400), None);
    }

    #[test]
    fn test_serializes_kind_in_upper_snake_case() {
        let err = AiError::new(AiErrorKind::RateLimited, "slow down", Some(429));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "RATE_LIMITED");
        assert_eq!(json["retryable"], true);
    }
}
