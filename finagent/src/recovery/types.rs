use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::user_errors::UserError;

/// How a classified failure is handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTier {
    /// Remediate and retry without involving anyone.
    Auto,
    /// Ask the user for input, then retry once input arrives.
    User,
    /// Stop immediately; retrying would be unsafe or pointless.
    Abort,
}

impl RecoveryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTier::Auto => "auto",
            RecoveryTier::User => "user",
            RecoveryTier::Abort => "abort",
        }
    }
}

impl std::fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure taxonomy for portal automation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Auto-recoverable
    SlowLoad,
    ElementNotFound,
    PopupInterrupt,
    SessionTimeout,
    NetworkError,
    // Needs the user
    InvalidAmount,
    InsufficientBalance,
    CaptchaRequired,
    OtpRequired,
    VerificationNeeded,
    // Must abort
    AccountLocked,
    SecurityBlock,
    CriticalFailure,
    MaxRetriesExceeded,
}

impl ErrorKind {
    pub fn tier(&self) -> RecoveryTier {
        match self {
            ErrorKind::SlowLoad
            | ErrorKind::ElementNotFound
            | ErrorKind::PopupInterrupt
            | ErrorKind::SessionTimeout
            | ErrorKind::NetworkError => RecoveryTier::Auto,
            ErrorKind::InvalidAmount
            | ErrorKind::InsufficientBalance
            | ErrorKind::CaptchaRequired
            | ErrorKind::OtpRequired
            | ErrorKind::VerificationNeeded => RecoveryTier::User,
            ErrorKind::AccountLocked
            | ErrorKind::SecurityBlock
            | ErrorKind::CriticalFailure
            | ErrorKind::MaxRetriesExceeded => RecoveryTier::Abort,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SlowLoad => "slow_load",
            ErrorKind::ElementNotFound => "element_not_found",
            ErrorKind::PopupInterrupt => "popup_interrupt",
            ErrorKind::SessionTimeout => "session_timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::CaptchaRequired => "captcha_required",
            ErrorKind::OtpRequired => "otp_required",
            ErrorKind::VerificationNeeded => "verification_needed",
            ErrorKind::AccountLocked => "account_locked",
            ErrorKind::SecurityBlock => "security_block",
            ErrorKind::CriticalFailure => "critical_failure",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified failure with its handling decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub kind: ErrorKind,
    pub tier: RecoveryTier,
    /// Raw technical message of the failure.
    pub message: String,
    /// Name of the action that failed.
    pub action: String,
    /// Retries already spent when this context was built.
    pub retry_count: u32,
    pub max_retries: u32,
    pub can_recover: bool,
    /// Prompt shown to the user for tier-2 failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

/// One remediated retry and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub kind: ErrorKind,
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub message: String,
}

/// Per-kind attempt counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindStats {
    pub total: usize,
    pub success: usize,
}

/// Aggregate recovery statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub total_attempts: usize,
    pub successful: usize,
    /// Fraction of attempts that succeeded, 0 when there were none.
    pub success_rate: f64,
    pub by_kind: HashMap<ErrorKind, KindStats>,
}

/// Terminal failure of a recovered operation.
///
/// Displays as the plain-language translation; the raw technical message
/// and the full [`UserError`] stay available on the fields.
#[derive(Debug, Clone, Error)]
#[error("{}", .user_error.message)]
pub struct RecoveryError {
    pub kind: ErrorKind,
    pub tier: RecoveryTier,
    /// Raw message of the last failed attempt.
    pub message: String,
    pub user_error: UserError,
    /// Total operation attempts made before giving up.
    pub attempts: u32,
}
