//! Approval request types shared between the gate and its frontends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Params, RiskLevel};

/// Lifecycle of one approval request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    TimedOut,
}

impl ApprovalStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ApprovalStatus::Pending)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One request for a human decision, shown to the user before a
/// high-risk action is allowed to proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Stable id like `APR-0001`, unique within the session.
    pub id: String,
    /// The action awaiting approval, e.g. `pay_bill`.
    pub action: String,
    /// Human-readable summary, e.g. `Pay ₹1,250.50 to Adani Power`.
    pub description: String,
    pub parameters: Params,
    pub risk_level: RiskLevel,
    pub requested_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    /// Screenshot of the page at request time, when the driver has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// A frontend that can answer approval requests, e.g. a web UI pushing
/// the request to the user and returning their click.
#[async_trait::async_trait]
pub trait DecisionPort: Send + Sync {
    /// Present the request and return `true` to approve it. The gate
    /// applies its own timeout around this call.
    async fn decide(&self, request: &ApprovalRequest) -> bool;
}
