use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ActionKind;

/// Which cap a check verdict refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Per-transaction cap
    Single,
    /// Daily cumulative cap
    Daily,
    /// Weekly cumulative cap, Monday-anchored
    Weekly,
    /// Calendar-month cumulative cap
    Monthly,
}

/// Per-action transaction caps. A cap of zero (or `None`) disables that
/// check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub single_limit: f64,
    pub daily_limit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
    /// Amounts strictly above this threshold get a 2FA advisory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_2fa_above: Option<f64>,
}

/// Built-in caps for the registered monetary actions.
pub fn default_limits() -> HashMap<ActionKind, LimitConfig> {
    let mut limits = HashMap::new();
    limits.insert(
        ActionKind::PayBill,
        LimitConfig {
            single_limit: 50_000.0,
            daily_limit: 200_000.0,
            weekly_limit: Some(500_000.0),
            monthly_limit: Some(1_000_000.0),
            requires_2fa_above: Some(25_000.0),
        },
    );
    limits.insert(
        ActionKind::FundTransfer,
        LimitConfig {
            single_limit: 100_000.0,
            daily_limit: 500_000.0,
            weekly_limit: Some(1_000_000.0),
            monthly_limit: Some(2_000_000.0),
            requires_2fa_above: Some(50_000.0),
        },
    );
    limits.insert(
        ActionKind::BuyGold,
        LimitConfig {
            single_limit: 100_000.0,
            daily_limit: 200_000.0,
            weekly_limit: Some(500_000.0),
            monthly_limit: Some(1_000_000.0),
            requires_2fa_above: Some(25_000.0),
        },
    );
    // No monetary caps; the approval policy is what gates profile edits.
    limits.insert(
        ActionKind::UpdateProfile,
        LimitConfig {
            single_limit: 0.0,
            daily_limit: 0.0,
            weekly_limit: None,
            monthly_limit: None,
            requires_2fa_above: Some(0.0),
        },
    );
    limits
}

/// One entry of the rolling transaction ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub action: ActionKind,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// Verdict of a limit check.
///
/// A disallowed verdict names the first violated cap in check order
/// (single, daily, weekly, monthly). An allowed verdict carries the
/// daily usage projection and the 2FA advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitCheckResult {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_kind: Option<LimitKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(default)]
    pub requires_2fa: bool,
}

impl LimitCheckResult {
    /// Allowed verdict for an action with no configured caps.
    pub fn unlimited() -> Self {
        LimitCheckResult {
            allowed: true,
            reason: None,
            limit_kind: None,
            limit_value: None,
            current_usage: None,
            remaining: None,
            requires_2fa: false,
        }
    }
}

/// Headroom still available to an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingLimits {
    pub single: f64,
    pub daily_remaining: Option<f64>,
    pub weekly_remaining: Option<f64>,
    pub monthly_remaining: Option<f64>,
}

/// Window totals used in [`UsageSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageWindows {
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
}

/// Window headroom; `None` where the cap is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingWindows {
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub monthly: Option<f64>,
}

/// Full usage picture for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub action: ActionKind,
    pub limits: LimitConfig,
    pub usage: UsageWindows,
    pub remaining: RemainingWindows,
    /// Percent of each cap consumed; 0 where the cap is disabled.
    pub utilization: UsageWindows,
}
