//! Technical-to-plain-language error translation.
//!
//! Pattern matching is ordered: the first matching substring wins, so
//! more specific patterns ("element not found") sit above generic ones
//! ("element"-adjacent categories matched elsewhere).

use serde::{Deserialize, Serialize};

/// Coarse category of a translated error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    ElementNotFound,
    ApiQuota,
    ApiError,
    Authentication,
    Authorization,
    Validation,
    Transaction,
    Browser,
    System,
    Unknown,
}

/// Plain-language rendering of a technical error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserError {
    pub category: ErrorCategory,
    pub message: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<String>,
    pub recoverable: bool,
    pub retry_allowed: bool,
}

/// (substring, category, message, suggestion), checked in order.
const ERROR_PATTERNS: &[(&str, ErrorCategory, &str, &str)] = &[
    // Network
    (
        "timeout",
        ErrorCategory::Timeout,
        "The page took too long to load.",
        "Please check your internet connection and try again.",
    ),
    (
        "net::err",
        ErrorCategory::Network,
        "Unable to connect to the server.",
        "Please check your internet connection.",
    ),
    (
        "connection refused",
        ErrorCategory::Network,
        "The server is not responding.",
        "Please make sure the banking server is running.",
    ),
    (
        "network",
        ErrorCategory::Network,
        "Network connection lost.",
        "Please check your internet and try again.",
    ),
    // API
    (
        "quota",
        ErrorCategory::ApiQuota,
        "Service temporarily unavailable.",
        "Please wait a moment and try again.",
    ),
    (
        "rate limit",
        ErrorCategory::ApiQuota,
        "Too many requests. Please slow down.",
        "Wait a few seconds before trying again.",
    ),
    (
        "429",
        ErrorCategory::ApiQuota,
        "Service is busy.",
        "Please try again in a few seconds.",
    ),
    (
        "api key",
        ErrorCategory::ApiError,
        "Authentication with AI service failed.",
        "Please check your API key configuration.",
    ),
    (
        "invalid api",
        ErrorCategory::ApiError,
        "API configuration issue.",
        "Please verify your API settings.",
    ),
    // Element detection
    (
        "element not found",
        ErrorCategory::ElementNotFound,
        "Could not find the required button or field.",
        "The page may have changed. Try refreshing.",
    ),
    (
        "selector",
        ErrorCategory::ElementNotFound,
        "Unable to locate the element.",
        "The page layout may have changed.",
    ),
    (
        "no such element",
        ErrorCategory::ElementNotFound,
        "The requested element doesn't exist.",
        "Please navigate to the correct page first.",
    ),
    // Authentication
    (
        "login failed",
        ErrorCategory::Authentication,
        "Login was unsuccessful.",
        "Please check your username and password.",
    ),
    (
        "session expired",
        ErrorCategory::Authentication,
        "Your session has expired.",
        "Please log in again.",
    ),
    (
        "unauthorized",
        ErrorCategory::Authorization,
        "You don't have permission for this action.",
        "Please check your account permissions.",
    ),
    (
        "403",
        ErrorCategory::Authorization,
        "Access denied.",
        "You may not have permission for this action.",
    ),
    // Transactions
    (
        "insufficient",
        ErrorCategory::Transaction,
        "Insufficient balance for this transaction.",
        "Please add funds or reduce the amount.",
    ),
    (
        "limit exceeded",
        ErrorCategory::Transaction,
        "Transaction limit exceeded.",
        "Try a smaller amount or wait for limit reset.",
    ),
    (
        "invalid amount",
        ErrorCategory::Validation,
        "The entered amount is invalid.",
        "Please enter a valid positive amount.",
    ),
    (
        "minimum amount",
        ErrorCategory::Validation,
        "Amount is below the minimum required.",
        "Please enter a higher amount.",
    ),
    (
        "maximum amount",
        ErrorCategory::Validation,
        "Amount exceeds the maximum allowed.",
        "Please enter a smaller amount.",
    ),
    // Browser
    (
        "browser",
        ErrorCategory::Browser,
        "Browser encountered an issue.",
        "Try refreshing the page.",
    ),
    (
        "playwright",
        ErrorCategory::Browser,
        "Browser automation error.",
        "The browser may need to be restarted.",
    ),
    (
        "page crash",
        ErrorCategory::Browser,
        "The page crashed.",
        "Please refresh and try again.",
    ),
    // Vision/AI
    (
        "vision",
        ErrorCategory::ApiError,
        "Visual recognition encountered an issue.",
        "The AI may need more time. Please try again.",
    ),
    (
        "model not found",
        ErrorCategory::ApiError,
        "AI model is temporarily unavailable.",
        "Switching to alternative model...",
    ),
    // Validation
    (
        "validation",
        ErrorCategory::Validation,
        "The input provided is invalid.",
        "Please check your input and try again.",
    ),
    (
        "required field",
        ErrorCategory::Validation,
        "Required information is missing.",
        "Please fill in all required fields.",
    ),
];

/// Patterns that mark an error as non-recoverable regardless of category.
const FATAL_PATTERNS: &[&str] = &[
    "fatal",
    "critical",
    "cannot recover",
    "system failure",
    "database error",
];

/// Translate a technical error message into a [`UserError`].
pub fn translate(technical_error: &str) -> UserError {
    let error_lower = technical_error.to_lowercase();
    let is_fatal = FATAL_PATTERNS
        .iter()
        .any(|pattern| error_lower.contains(pattern));

    for (pattern, category, message, suggestion) in ERROR_PATTERNS {
        if error_lower.contains(pattern) {
            return UserError {
                category: *category,
                message: (*message).to_string(),
                suggestion: (*suggestion).to_string(),
                technical_details: Some(technical_error.to_string()),
                recoverable: !is_fatal,
                retry_allowed: !matches!(
                    category,
                    ErrorCategory::Authorization | ErrorCategory::Validation
                ),
            };
        }
    }

    UserError {
        category: ErrorCategory::Unknown,
        message: "Something went wrong.".to_string(),
        suggestion: "Please try again or contact support if the issue persists.".to_string(),
        technical_details: Some(technical_error.to_string()),
        recoverable: !is_fatal,
        retry_allowed: true,
    }
}

/// Render a [`UserError`] for display, optionally with the technical text.
pub fn format_for_display(error: &UserError, show_technical: bool) -> String {
    let mut lines = vec![
        format!("❌ {}", error.message),
        format!("💡 {}", error.suggestion),
    ];
    if error.retry_allowed {
        lines.push("🔄 You can try again.".to_string());
    }
    if show_technical {
        if let Some(details) = &error.technical_details {
            lines.push(format!("\n📋 Technical: {}", details));
        }
    }
    lines.join("\n")
}

/// Whether an error is potentially recoverable.
pub fn is_recoverable(technical_error: &str) -> bool {
    translate(technical_error).recoverable
}

/// Whether an error should trigger a retry.
pub fn should_retry(technical_error: &str) -> bool {
    translate(technical_error).retry_allowed
}

/// Category of a technical error.
pub fn category_of(technical_error: &str) -> ErrorCategory {
    translate(technical_error).category
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_pattern_wins() {
        // "timeout" sits above "network" in the table
        let error = translate("Timeout while waiting for network");
        assert_eq!(error.category, ErrorCategory::Timeout);
        assert_eq!(error.message, "The page took too long to load.");
    }

    #[test]
    fn quota_errors_allow_retry() {
        let error = translate("429 Resource exhausted: quota exceeded");
        assert_eq!(error.category, ErrorCategory::ApiQuota);
        assert!(error.retry_allowed);
        assert!(error.recoverable);
    }

    #[test]
    fn authorization_and_validation_block_retry() {
        assert!(!should_retry("403 Forbidden"));
        assert!(!should_retry("validation error on field amount"));
        assert!(should_retry("network hiccup"));
    }

    #[test]
    fn fatal_markers_make_errors_unrecoverable() {
        let error = translate("fatal: database error while saving");
        assert!(!error.recoverable);
        assert!(!is_recoverable("critical browser failure"));
        assert!(is_recoverable("slow network"));
    }

    #[test]
    fn unknown_errors_get_generic_guidance() {
        let error = translate("flux capacitor misaligned");
        assert_eq!(error.category, ErrorCategory::Unknown);
        assert_eq!(error.message, "Something went wrong.");
        assert!(error.retry_allowed);
    }

    #[test]
    fn display_includes_retry_hint_only_when_allowed() {
        let retryable = translate("network down");
        let rendered = format_for_display(&retryable, false);
        assert!(rendered.contains("🔄 You can try again."));
        assert!(!rendered.contains("📋"));

        let blocked = translate("403 Forbidden");
        let rendered = format_for_display(&blocked, true);
        assert!(!rendered.contains("🔄"));
        assert!(rendered.contains("📋 Technical: 403 Forbidden"));
    }
}
