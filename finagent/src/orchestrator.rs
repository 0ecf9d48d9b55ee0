//! Task planning and execution.
//!
//! ```text
//! ParsedIntent ──► build_steps ──► [login?] [navigate] [act] [confirm]
//!                                     │
//!                          per step:  ├── limiter.check (monetary)
//!                                     ├── recovery.with_recovery(driver)
//!                                     └── approval gate (confirm steps)
//! ```
//!
//! The orchestrator turns one parsed intent into a [`Task`] of sequential
//! steps and runs them against the [`PortalDriver`]. Monetary steps are
//! checked against transaction limits before touching the portal, every
//! high-risk action ends in a confirmation step that waits at the
//! approval gate, and driver failures go through the tiered recovery
//! engine before they fail the task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};

use crate::approval::{ApprovalGate, ApprovalStatus};
use crate::config::OrchestratorConfig;
use crate::driver::PortalDriver;
use crate::events::{NoopEvents, TaskEventSink};
use crate::limits::{format_limit_message, TransactionLimiter};
use crate::metrics::{CommandRecord, SessionMetrics};
use crate::recovery::{ErrorRecoveryEngine, RecoveryError};
use crate::types::{
    ActionKind, ActionResult, Params, ParsedIntent, StepAction, Task, TaskStatus, TaskStep,
};
use crate::utils::{capitalize, format_inr};

const UNPARSED_MESSAGE: &str = "Could not understand the command. Please try rephrasing.";

/// Beneficiaries the demo portal already knows; transfers to them go
/// through the picker instead of the manual account form.
const KNOWN_BENEFICIARIES: [&str; 3] = ["mom", "dad", "friend"];

pub struct TaskOrchestrator {
    driver: Arc<dyn PortalDriver>,
    gate: Arc<ApprovalGate>,
    limiter: Arc<TransactionLimiter>,
    recovery: Arc<ErrorRecoveryEngine>,
    events: Arc<dyn TaskEventSink>,
    metrics: Arc<SessionMetrics>,
    config: OrchestratorConfig,
    tasks: Mutex<Vec<Task>>,
    task_counter: AtomicU64,
}

impl TaskOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        driver: Arc<dyn PortalDriver>,
        gate: Arc<ApprovalGate>,
        limiter: Arc<TransactionLimiter>,
        recovery: Arc<ErrorRecoveryEngine>,
    ) -> Self {
        TaskOrchestrator {
            driver,
            gate,
            limiter,
            recovery,
            events: Arc::new(NoopEvents),
            metrics: Arc::new(SessionMetrics::new()),
            config,
            tasks: Mutex::new(Vec::new()),
            task_counter: AtomicU64::new(0),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn TaskEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<SessionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Plan and run one parsed intent to completion. The returned task
    /// carries the final status and per-step results.
    pub async fn process_intent(&self, intent: &ParsedIntent) -> Task {
        let command = intent
            .original_command
            .clone()
            .unwrap_or_else(|| intent.action.clone());

        let action = match ActionKind::parse(&intent.action) {
            Some(action) => action,
            None => {
                log::warn!("unparseable action \"{}\"", intent.action);
                return self.fail_unparsed(&command).await;
            }
        };

        let mut task = self.create_task(&command, action, &intent.parameters);
        self.execute_task(&mut task, action).await;
        task
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        let tasks = self.tasks.lock().unwrap();
        tasks.iter().find(|task| task.id == task_id).cloned()
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    fn create_task(&self, command: &str, action: ActionKind, params: &Params) -> Task {
        let mut task = Task::new(self.next_task_id(), command);
        task.steps = self.build_steps(action, params);
        log::info!(
            "created {} with {} step(s) for {}",
            task.id,
            task.steps.len(),
            action
        );
        self.store(&task);
        task
    }

    /// A task whose command never parsed into an action. It is stored
    /// and reported like any other failure so frontends see it.
    async fn fail_unparsed(&self, command: &str) -> Task {
        let mut task = Task::new(self.next_task_id(), command);
        let mut step = TaskStep::new(1, StepAction::Error, Params::new());
        step.status = TaskStatus::Failed;
        step.error = Some(UNPARSED_MESSAGE.to_string());
        task.steps.push(step);
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        self.store(&task);

        self.metrics.record_command(CommandRecord {
            command: command.to_string(),
            action: "unknown".to_string(),
            started_at: task.created_at,
            duration_ms: 0,
            success: false,
            error: Some(UNPARSED_MESSAGE.to_string()),
            steps: 1,
            approval_required: false,
            approval_granted: None,
        });
        self.events.task_completed(&task).await;
        task
    }

    fn next_task_id(&self) -> String {
        format!(
            "TASK-{:04}",
            self.task_counter.fetch_add(1, Ordering::SeqCst) + 1
        )
    }

    /// Expand an action into its step plan: implicit login when the
    /// session is cold, navigation, the action itself, and a trailing
    /// confirmation step for everything that needs approval.
    fn build_steps(&self, action: ActionKind, params: &Params) -> Vec<TaskStep> {
        let mut steps = StepList::default();

        if !self.driver.is_authenticated() && action != ActionKind::Login {
            let mut login = Params::new();
            login.insert(
                "username".to_string(),
                Value::String(self.config.login_username.clone()),
            );
            login.insert(
                "password".to_string(),
                Value::String(self.config.login_password.clone()),
            );
            steps.push(StepAction::Login, login);
        }

        match action {
            ActionKind::PayBill => {
                steps.push(StepAction::NavigateToPayBills, Params::new());
                let mut pay = Params::new();
                pay.insert(
                    "biller".to_string(),
                    params
                        .get("biller_name")
                        .cloned()
                        .unwrap_or_else(|| json!("Adani Power")),
                );
                pay.insert(
                    "consumer_number".to_string(),
                    params
                        .get("consumer_number")
                        .cloned()
                        .unwrap_or_else(|| json!("100234567890")),
                );
                pay.insert(
                    "amount".to_string(),
                    params.get("amount").cloned().unwrap_or_else(|| json!(1000)),
                );
                steps.push(StepAction::PayBill, pay);
            }
            ActionKind::FundTransfer => {
                steps.push(StepAction::NavigateToFundTransfer, Params::new());
                if let Some(recipient) = params.get("recipient").and_then(|value| value.as_str()) {
                    if KNOWN_BENEFICIARIES.contains(&recipient.to_lowercase().as_str()) {
                        let mut select = Params::new();
                        select.insert("name".to_string(), json!(capitalize(recipient)));
                        steps.push(StepAction::SelectBeneficiary, select);
                    }
                }
                let mut transfer = Params::new();
                transfer.insert(
                    "recipient".to_string(),
                    params.get("recipient").cloned().unwrap_or_else(|| json!("")),
                );
                transfer.insert(
                    "account".to_string(),
                    params
                        .get("account")
                        .cloned()
                        .unwrap_or_else(|| json!("9876543210")),
                );
                transfer.insert(
                    "ifsc".to_string(),
                    params
                        .get("ifsc")
                        .cloned()
                        .unwrap_or_else(|| json!("JFIN0001234")),
                );
                transfer.insert(
                    "amount".to_string(),
                    params.get("amount").cloned().unwrap_or_else(|| json!(0)),
                );
                steps.push(StepAction::FundTransfer, transfer);
            }
            ActionKind::BuyGold => {
                steps.push(StepAction::NavigateToBuyGold, Params::new());
                let mut buy = Params::new();
                if let Some(amount) = params.get("amount") {
                    buy.insert("amount".to_string(), amount.clone());
                }
                if let Some(grams) = params.get("grams") {
                    buy.insert("grams".to_string(), grams.clone());
                }
                steps.push(StepAction::BuyGold, buy);
            }
            ActionKind::CheckBalance | ActionKind::ViewTransactions => {
                steps.push(action.into(), Params::new());
            }
            ActionKind::Login | ActionKind::ViewProfile | ActionKind::UpdateProfile => {
                steps.push(action.into(), params.clone());
            }
        }

        if action.requires_approval() {
            let mut confirm = params.clone();
            confirm.insert("parent_action".to_string(), json!(action.as_str()));
            steps.push(StepAction::ConfirmWithApproval, confirm);
        }

        steps.into_vec()
    }

    async fn execute_task(&self, task: &mut Task, action: ActionKind) {
        task.status = TaskStatus::InProgress;
        self.store(task);

        let total = task.steps.len();
        for index in 0..total {
            task.current_step = index as u32 + 1;
            task.steps[index].status = TaskStatus::InProgress;
            self.store(task);

            let started_step = task.steps[index].clone();
            log::info!(
                "{} step {}/{}: {}",
                task.id,
                started_step.id,
                total,
                started_step.action
            );
            self.events.step_started(task, &started_step).await;

            match self.execute_step(task, index).await {
                Ok(result) => {
                    let step = &mut task.steps[index];
                    if result.success {
                        step.status = TaskStatus::Completed;
                        log::info!("{} step {} ok: {}", task.id, step.id, result.message);
                        step.result = Some(result);
                        let completed_step = step.clone();
                        self.store(task);
                        self.events.step_completed(task, &completed_step).await;
                    } else {
                        step.status = TaskStatus::Failed;
                        step.error = Some(result.message.clone());
                        log::warn!("{} step {} failed: {}", task.id, step.id, result.message);
                        step.result = Some(result);
                        task.status = TaskStatus::Failed;
                        self.store(task);
                        break;
                    }
                }
                Err(err) => {
                    let step = &mut task.steps[index];
                    step.status = TaskStatus::Failed;
                    step.error = Some(err.to_string());
                    task.status = TaskStatus::Failed;
                    log::error!("{} step {} gave up: {}", task.id, step.id, err);
                    self.store(task);
                    break;
                }
            }

            if index + 1 < total && !self.config.step_delay().is_zero() {
                tokio::time::sleep(self.config.step_delay()).await;
            }
        }

        if task.status == TaskStatus::InProgress {
            task.status = TaskStatus::Completed;
        }
        task.completed_at = Some(Utc::now());
        self.store(task);

        self.record_outcome(task, action);
        self.events.task_completed(task).await;
        log::info!(
            "{} {}",
            task.id,
            if task.status.is_completed() {
                "completed"
            } else {
                "failed"
            }
        );
    }

    async fn execute_step(
        &self,
        task: &mut Task,
        index: usize,
    ) -> Result<ActionResult, RecoveryError> {
        let step = task.steps[index].clone();

        if step.action == StepAction::ConfirmWithApproval {
            return Ok(self.handle_approval_step(task, index).await);
        }

        // Limits are enforced before the portal sees the transaction.
        if let Some(kind) = step.action.monetary_kind() {
            let amount = step
                .parameters
                .get("amount")
                .and_then(|value| value.as_f64())
                .unwrap_or(0.0);
            if amount > 0.0 {
                let check = self.limiter.check(kind, amount);
                if !check.allowed {
                    log::warn!("{} blocked: {}", step.action, format_limit_message(&check));
                    let reason = check
                        .reason
                        .unwrap_or_else(|| "Transaction limit exceeded".to_string());
                    return Ok(ActionResult::failed(step.action.as_str(), reason));
                }
                if check.requires_2fa {
                    log::info!(
                        "2FA advisory: {} of ₹{} is above the confirmation threshold",
                        step.action,
                        format_inr(amount)
                    );
                }
            }
        }

        let driver = Arc::clone(&self.driver);
        let action = step.action;
        let params = step.parameters;
        self.recovery
            .with_recovery(
                move || {
                    let driver = Arc::clone(&driver);
                    let params = params.clone();
                    async move { driver.execute(action, &params).await }
                },
                action.as_str(),
                None,
            )
            .await
    }

    /// Run one confirmation step: park at the gate, then either confirm
    /// the pending portal action or cancel it.
    async fn handle_approval_step(&self, task: &mut Task, index: usize) -> ActionResult {
        let params = task.steps[index].parameters.clone();
        let parent_action = params
            .get("parent_action")
            .and_then(|value| value.as_str())
            .unwrap_or("unknown")
            .to_string();

        let screenshot = self.driver.take_screenshot().await;
        let request = self.gate.request_approval(&parent_action, params.clone(), screenshot);

        task.steps[index].status = TaskStatus::AwaitingApproval;
        task.status = TaskStatus::AwaitingApproval;
        self.store(task);
        self.events.approval_needed(&request).await;

        let status = self.gate.wait_for_approval(&request, None).await;
        task.status = TaskStatus::InProgress;
        self.metrics.record_approval(status.is_approved());

        match status {
            ApprovalStatus::Approved => {
                match self.driver.execute(StepAction::ConfirmAction, &params).await {
                    Ok(result) => result,
                    Err(err) => ActionResult::failed("confirm_action", err.to_string()),
                }
            }
            ApprovalStatus::Rejected => {
                self.cancel_pending().await;
                ActionResult::failed("confirm_with_approval", "Action rejected by user")
            }
            _ => {
                self.cancel_pending().await;
                ActionResult::failed(
                    "confirm_with_approval",
                    "Approval timeout - action cancelled for safety",
                )
            }
        }
    }

    /// Best-effort cancel of the portal's pending confirmation dialog
    /// after a refused or expired approval.
    async fn cancel_pending(&self) {
        if let Err(err) = self
            .driver
            .execute(StepAction::CancelAction, &Params::new())
            .await
        {
            log::warn!("cancel after refused approval failed: {}", err);
        }
    }

    /// Ledger and metrics bookkeeping once a task reaches a terminal
    /// status. Only completed tasks count against transaction limits.
    fn record_outcome(&self, task: &Task, action: ActionKind) {
        let success = task.status.is_completed();

        if action.is_monetary() {
            let monetary_step = task
                .steps
                .iter()
                .find(|step| step.action.monetary_kind() == Some(action));
            if let Some(step) = monetary_step {
                let amount = step
                    .parameters
                    .get("amount")
                    .and_then(|value| value.as_f64())
                    .unwrap_or(0.0);
                if amount > 0.0 {
                    self.limiter.record(action, amount, success);
                }
            }
        }

        let approval_granted = task
            .steps
            .iter()
            .find(|step| step.action == StepAction::ConfirmWithApproval)
            .and_then(|step| match step.status {
                TaskStatus::Completed => Some(true),
                TaskStatus::Failed => Some(false),
                _ => None,
            });

        let duration_ms = task
            .completed_at
            .map(|done| (done - task.created_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        self.metrics.record_command(CommandRecord {
            command: task.original_command.clone(),
            action: action.as_str().to_string(),
            started_at: task.created_at,
            duration_ms,
            success,
            error: task.steps.iter().rev().find_map(|step| step.error.clone()),
            steps: task.steps.len(),
            approval_required: action.requires_approval(),
            approval_granted,
        });
    }

    fn store(&self, task: &Task) {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|stored| stored.id == task.id) {
            Some(slot) => *slot = task.clone(),
            None => tasks.push(task.clone()),
        }
    }
}

/// Builder for sequential step plans; ids are assigned as steps land.
#[derive(Default)]
struct StepList(Vec<TaskStep>);

impl StepList {
    fn push(&mut self, action: StepAction, parameters: Params) {
        let id = self.0.len() as u32 + 1;
        self.0.push(TaskStep::new(id, action, parameters));
    }

    fn into_vec(self) -> Vec<TaskStep> {
        self.0
    }
}
