//! Core domain types: actions, intents, tasks and step outcomes.
//!
//! Every portal operation the agent knows about is a variant of
//! [`ActionKind`] (user-facing intents) or [`StepAction`] (the concrete
//! commands a task plan is made of). Keeping both closed enums means the
//! risk policy and the step templates are total: there is no string an
//! intent parser can hand us that silently bypasses the policy table.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameter bag attached to intents and steps.
pub type Params = serde_json::Map<String, Value>;

/// Risk classification used by the approval policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User-facing portal actions the agent can carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Login,
    CheckBalance,
    ViewProfile,
    ViewTransactions,
    PayBill,
    FundTransfer,
    BuyGold,
    UpdateProfile,
}

impl ActionKind {
    /// Every registered action, in policy-table order.
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Login,
        ActionKind::CheckBalance,
        ActionKind::ViewProfile,
        ActionKind::ViewTransactions,
        ActionKind::PayBill,
        ActionKind::FundTransfer,
        ActionKind::BuyGold,
        ActionKind::UpdateProfile,
    ];

    /// Parse an intent action name. Unknown names return `None` so the
    /// caller can fail the task instead of guessing.
    pub fn parse(name: &str) -> Option<ActionKind> {
        match name {
            "login" => Some(ActionKind::Login),
            "check_balance" => Some(ActionKind::CheckBalance),
            "view_profile" => Some(ActionKind::ViewProfile),
            "view_transactions" => Some(ActionKind::ViewTransactions),
            "pay_bill" => Some(ActionKind::PayBill),
            "fund_transfer" => Some(ActionKind::FundTransfer),
            "buy_gold" => Some(ActionKind::BuyGold),
            "update_profile" => Some(ActionKind::UpdateProfile),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Login => "login",
            ActionKind::CheckBalance => "check_balance",
            ActionKind::ViewProfile => "view_profile",
            ActionKind::ViewTransactions => "view_transactions",
            ActionKind::PayBill => "pay_bill",
            ActionKind::FundTransfer => "fund_transfer",
            ActionKind::BuyGold => "buy_gold",
            ActionKind::UpdateProfile => "update_profile",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ActionKind::Login => "Log into the banking portal",
            ActionKind::CheckBalance => "Check account balance",
            ActionKind::ViewProfile => "View profile information",
            ActionKind::ViewTransactions => "View transaction history",
            ActionKind::PayBill => "Pay a utility bill",
            ActionKind::FundTransfer => "Transfer funds to another account",
            ActionKind::BuyGold => "Purchase digital gold",
            ActionKind::UpdateProfile => "Update profile information",
        }
    }

    /// Risk level from the policy table.
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            ActionKind::Login
            | ActionKind::CheckBalance
            | ActionKind::ViewProfile
            | ActionKind::ViewTransactions => RiskLevel::Low,
            ActionKind::UpdateProfile => RiskLevel::Medium,
            ActionKind::PayBill | ActionKind::FundTransfer | ActionKind::BuyGold => RiskLevel::High,
        }
    }

    /// Whether the action must pass through the conscious-pause checkpoint.
    pub fn requires_approval(&self) -> bool {
        matches!(
            self,
            ActionKind::PayBill
                | ActionKind::FundTransfer
                | ActionKind::BuyGold
                | ActionKind::UpdateProfile
        )
    }

    /// Monetary actions move funds and are subject to transaction limits.
    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            ActionKind::PayBill | ActionKind::FundTransfer | ActionKind::BuyGold
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete step commands a task plan is assembled from.
///
/// This is the full command surface of the page driver: navigation,
/// form-filling actions, and the confirm/cancel pair the approval flow
/// drives. `Error` is the placeholder step of a task that failed before
/// planning produced anything executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Login,
    CheckBalance,
    ViewProfile,
    ViewTransactions,
    NavigateToPayBills,
    PayBill,
    NavigateToFundTransfer,
    SelectBeneficiary,
    FundTransfer,
    NavigateToBuyGold,
    BuyGold,
    UpdateProfile,
    ConfirmWithApproval,
    ConfirmAction,
    CancelAction,
    DismissModal,
    Error,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Login => "login",
            StepAction::CheckBalance => "check_balance",
            StepAction::ViewProfile => "view_profile",
            StepAction::ViewTransactions => "view_transactions",
            StepAction::NavigateToPayBills => "navigate_to_pay_bills",
            StepAction::PayBill => "pay_bill",
            StepAction::NavigateToFundTransfer => "navigate_to_fund_transfer",
            StepAction::SelectBeneficiary => "select_beneficiary",
            StepAction::FundTransfer => "fund_transfer",
            StepAction::NavigateToBuyGold => "navigate_to_buy_gold",
            StepAction::BuyGold => "buy_gold",
            StepAction::UpdateProfile => "update_profile",
            StepAction::ConfirmWithApproval => "confirm_with_approval",
            StepAction::ConfirmAction => "confirm_action",
            StepAction::CancelAction => "cancel_action",
            StepAction::DismissModal => "dismiss_modal",
            StepAction::Error => "error",
        }
    }

    /// The limited action this step spends money under, if any.
    pub fn monetary_kind(&self) -> Option<ActionKind> {
        match self {
            StepAction::PayBill => Some(ActionKind::PayBill),
            StepAction::FundTransfer => Some(ActionKind::FundTransfer),
            StepAction::BuyGold => Some(ActionKind::BuyGold),
            _ => None,
        }
    }
}

impl From<ActionKind> for StepAction {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Login => StepAction::Login,
            ActionKind::CheckBalance => StepAction::CheckBalance,
            ActionKind::ViewProfile => StepAction::ViewProfile,
            ActionKind::ViewTransactions => StepAction::ViewTransactions,
            ActionKind::PayBill => StepAction::PayBill,
            ActionKind::FundTransfer => StepAction::FundTransfer,
            ActionKind::BuyGold => StepAction::BuyGold,
            ActionKind::UpdateProfile => StepAction::UpdateProfile,
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured intent handed to the orchestrator by an upstream parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    /// Action name as produced by the parser. May be unknown.
    pub action: String,
    #[serde(default)]
    pub parameters: Params,
    pub confidence: f64,
    /// Raw user utterance, when the parser kept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_command: Option<String>,
}

impl ParsedIntent {
    pub fn new(action: impl Into<String>, parameters: Params, confidence: f64) -> Self {
        ParsedIntent {
            action: action.into(),
            parameters,
            confidence,
            original_command: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.original_command = Some(command.into());
        self
    }
}

/// Outcome of one driver action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Opaque reference to a screenshot captured with the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl ActionResult {
    pub fn ok(action: impl Into<String>, message: impl Into<String>) -> Self {
        ActionResult {
            success: true,
            action: action.into(),
            message: message.into(),
            data: None,
            screenshot: None,
        }
    }

    pub fn failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        ActionResult {
            success: false,
            action: action.into(),
            message: message.into(),
            data: None,
            screenshot: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Lifecycle states shared by tasks and their steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed)
    }
}

/// One executable unit of a task plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Position in the plan, starting at 1.
    pub id: u32,
    pub action: StepAction,
    #[serde(default)]
    pub parameters: Params,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskStep {
    pub fn new(id: u32, action: StepAction, parameters: Params) -> Self {
        TaskStep {
            id,
            action,
            parameters,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// A planned unit of work derived from one user command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub original_command: String,
    pub steps: Vec<TaskStep>,
    pub status: TaskStatus,
    /// 1-based index of the step currently (or last) executed.
    pub current_step: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, original_command: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            original_command: original_command.into(),
            steps: Vec::new(),
            status: TaskStatus::Pending,
            current_step: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
