//! Typed LLM failures.

use helpdesk_core::error::HelpdeskError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// No answer within the configured timeout.
    Timeout,
    /// Missing, invalid or revoked API key.
    Auth,
    /// Quota exhausted or payment required.
    Billing,
    RateLimit,
    /// Provider down, overloaded or unreachable.
    Unavailable,
    Other,
}

impl LlmErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmErrorKind::Timeout => "timeout",
            LlmErrorKind::Auth => "auth",
            LlmErrorKind::Billing => "billing",
            LlmErrorKind::RateLimit => "rate_limit",
            LlmErrorKind::Unavailable => "unavailable",
            LlmErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("LLM {kind} error: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Text shown to the visitor instead of the raw error.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            LlmErrorKind::Timeout => {
                "Our assistant is taking too long to answer. Please try again in a moment."
            }
            LlmErrorKind::RateLimit => {
                "We are receiving a lot of questions right now. Please try again in a few seconds."
            }
            LlmErrorKind::Auth | LlmErrorKind::Billing => {
                "The assistant is not available at the moment. A member of our team will get back to you shortly."
            }
            LlmErrorKind::Unavailable => {
                "The assistant is temporarily unavailable. Please try again shortly."
            }
            LlmErrorKind::Other => {
                "Sorry, I could not answer that right now. A member of our team will follow up."
            }
        }
    }

    pub(crate) fn from_transport(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            LlmErrorKind::Timeout
        } else if e.is_connect() {
            LlmErrorKind::Unavailable
        } else {
            LlmErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

impl From<LlmError> for HelpdeskError {
    fn from(e: LlmError) -> Self {
        HelpdeskError::Provider(e.to_string())
    }
}

/// Classify a non-success provider response by status and message content.
///
/// Body content wins over status: OpenAI reports exhausted quota as a 429.
pub fn classify_failure(status: u16, body: &str) -> LlmErrorKind {
    let text = body.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if has(&["insufficient_quota", "billing", "quota", "payment required", "credit balance"]) {
        LlmErrorKind::Billing
    } else if has(&["invalid_api_key", "invalid api key", "incorrect api key", "unauthorized", "authentication"]) {
        LlmErrorKind::Auth
    } else if has(&["rate limit", "rate_limit", "too many requests"]) {
        LlmErrorKind::RateLimit
    } else if has(&["timed out", "timeout"]) {
        LlmErrorKind::Timeout
    } else if has(&["overloaded", "unavailable"]) {
        LlmErrorKind::Unavailable
    } else {
        match status {
            401 | 403 => LlmErrorKind::Auth,
            402 => LlmErrorKind::Billing,
            429 => LlmErrorKind::RateLimit,
            408 | 504 => LlmErrorKind::Timeout,
            500..=599 => LlmErrorKind::Unavailable,
            _ => LlmErrorKind::Other,
        }
    }
}
