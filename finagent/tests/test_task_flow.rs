//! End-to-end orchestrator flows against a scripted portal driver:
//! step planning, the approval checkpoint, limit enforcement and the
//! bookkeeping that follows a terminal task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use finagent::approval::{ApprovalGate, ApprovalRequest, ApprovalStatus, DecisionPort};
use finagent::config::{ApprovalConfig, OrchestratorConfig, RecoveryConfig};
use finagent::driver::PortalDriver;
use finagent::error::AgentError;
use finagent::events::TaskEventSink;
use finagent::limits::TransactionLimiter;
use finagent::recovery::{ErrorKind, ErrorRecoveryEngine};
use finagent::types::{
    ActionKind, ActionResult, Params, ParsedIntent, StepAction, Task, TaskStatus, TaskStep,
};
use finagent::TaskOrchestrator;

// --- Test Setup ---

/// Portal driver that records every action and succeeds unless a
/// failure has been scripted for that action.
struct FakeDriver {
    authenticated: AtomicBool,
    log: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
}

impl FakeDriver {
    fn new() -> Self {
        FakeDriver {
            authenticated: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Every execution of `action` will fail with `message`.
    fn fail_with(&self, action: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(action.to_string(), message.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, action: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == action)
            .count()
    }
}

#[async_trait::async_trait]
impl PortalDriver for FakeDriver {
    async fn execute(
        &self,
        action: StepAction,
        _parameters: &Params,
    ) -> Result<ActionResult, AgentError> {
        let name = action.as_str().to_string();
        self.log.lock().unwrap().push(name.clone());

        if let Some(message) = self.failures.lock().unwrap().get(&name) {
            return Err(AgentError::Driver(message.clone()));
        }
        if action == StepAction::Login {
            self.authenticated.store(true, Ordering::SeqCst);
        }
        Ok(ActionResult::ok(name, "done"))
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn take_screenshot(&self) -> Option<String> {
        Some("screenshot-bytes".to_string())
    }
}

/// Event sink that flattens everything it sees into one line per event.
#[derive(Default)]
struct RecordingEvents {
    lines: Mutex<Vec<String>>,
}

impl RecordingEvents {
    fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.snapshot()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

#[async_trait::async_trait]
impl TaskEventSink for RecordingEvents {
    async fn step_started(&self, _task: &Task, step: &TaskStep) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("start {}", step.action));
    }

    async fn approval_needed(&self, request: &ApprovalRequest) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("approval_needed {}", request.action));
    }

    async fn approval_decided(&self, request: &ApprovalRequest) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("approval_decided {}", request.status));
    }

    async fn task_completed(&self, task: &Task) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("task_completed {:?}", task.status));
    }
}

struct ApproveAll;

#[async_trait::async_trait]
impl DecisionPort for ApproveAll {
    async fn decide(&self, _request: &ApprovalRequest) -> bool {
        true
    }
}

struct RejectAll;

#[async_trait::async_trait]
impl DecisionPort for RejectAll {
    async fn decide(&self, _request: &ApprovalRequest) -> bool {
        false
    }
}

struct Harness {
    orchestrator: TaskOrchestrator,
    driver: Arc<FakeDriver>,
    events: Arc<RecordingEvents>,
    gate: Arc<ApprovalGate>,
    limiter: Arc<TransactionLimiter>,
    recovery: Arc<ErrorRecoveryEngine>,
}

/// Wire a full orchestrator with no delays and a one second approval
/// timeout so the unattended path stays testable.
fn harness(port: Option<Arc<dyn DecisionPort>>) -> Harness {
    let driver = Arc::new(FakeDriver::new());
    let events = Arc::new(RecordingEvents::default());

    let mut gate = ApprovalGate::new(&ApprovalConfig { timeout_secs: 1 }, events.clone());
    if let Some(port) = port {
        gate = gate.with_decision_port(port);
    }
    let gate = Arc::new(gate);

    let limiter = Arc::new(TransactionLimiter::new());
    let recovery = Arc::new(ErrorRecoveryEngine::new(RecoveryConfig {
        max_retries: 2,
        slow_load_delay_ms: 0,
        element_retry_delay_ms: 0,
        network_delay_ms: 0,
    }));

    let config = OrchestratorConfig {
        step_delay_ms: 0,
        ..OrchestratorConfig::default()
    };
    let orchestrator = TaskOrchestrator::new(
        config,
        driver.clone(),
        gate.clone(),
        limiter.clone(),
        recovery.clone(),
    )
    .with_events(events.clone());

    Harness {
        orchestrator,
        driver,
        events,
        gate,
        limiter,
        recovery,
    }
}

fn intent(action: &str) -> ParsedIntent {
    ParsedIntent::new(action, Params::new(), 0.9)
}

fn payment_intent(amount: f64) -> ParsedIntent {
    let params: Params = [
        ("biller_name".to_string(), json!("Adani Power")),
        ("amount".to_string(), json!(amount)),
    ]
    .into_iter()
    .collect();
    ParsedIntent::new("pay_bill", params, 0.95).with_command("pay my electricity bill")
}

// --- Tests ---

#[tokio::test]
async fn balance_check_gets_an_implicit_login() {
    let h = harness(None);

    let task = h.orchestrator.process_intent(&intent("check_balance")).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.completed_at.is_some());
    assert_eq!(h.driver.calls(), vec!["login", "check_balance"]);
    assert_eq!(h.events.count("task_completed"), 1);
}

#[tokio::test]
async fn approved_payment_runs_the_confirmation() {
    let h = harness(Some(Arc::new(ApproveAll)));

    let task = h.orchestrator.process_intent(&payment_intent(5000.0)).await;

    // login, navigate, pay, confirm
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.steps.len(), 4);
    assert!(task
        .steps
        .iter()
        .all(|step| step.status == TaskStatus::Completed));
    assert_eq!(
        h.driver.calls(),
        vec!["login", "navigate_to_pay_bills", "pay_bill", "confirm_action"]
    );
    assert_eq!(h.driver.count("cancel_action"), 0);

    // The gate recorded one approved request with a readable summary.
    let history = h.gate.history(10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ApprovalStatus::Approved);
    assert_eq!(history[0].description, "Pay ₹5,000.00 to Adani Power");

    assert_eq!(h.events.count("approval_needed"), 1);
    assert_eq!(h.events.count("task_completed"), 1);

    let summary = h.orchestrator.metrics().summary();
    assert_eq!(summary.approvals.requested, 1);
    assert_eq!(summary.approvals.granted, 1);
    assert_eq!(summary.commands.successful, 1);
}

#[tokio::test]
async fn rejected_payment_cancels_the_pending_action() {
    let h = harness(Some(Arc::new(RejectAll)));

    let task = h.orchestrator.process_intent(&payment_intent(5000.0)).await;

    assert_eq!(task.status, TaskStatus::Failed);
    let confirm = task.steps.last().unwrap();
    assert_eq!(confirm.action, StepAction::ConfirmWithApproval);
    assert_eq!(confirm.status, TaskStatus::Failed);
    assert_eq!(confirm.error.as_deref(), Some("Action rejected by user"));

    // The portal saw a cancel, never a confirm.
    assert_eq!(h.driver.count("cancel_action"), 1);
    assert_eq!(h.driver.count("confirm_action"), 0);

    // A refused payment never consumes the allowance.
    let usage = h.limiter.usage_summary(ActionKind::PayBill).unwrap();
    assert_eq!(usage.usage.daily, 0.0);

    let summary = h.orchestrator.metrics().summary();
    assert_eq!(summary.approvals.denied, 1);
    assert_eq!(summary.commands.failed, 1);
}

#[tokio::test]
async fn unattended_approval_times_out_and_cancels() {
    let h = harness(None);

    let task = h.orchestrator.process_intent(&payment_intent(2500.0)).await;

    assert_eq!(task.status, TaskStatus::Failed);
    let confirm = task.steps.last().unwrap();
    assert_eq!(
        confirm.error.as_deref(),
        Some("Approval timeout - action cancelled for safety")
    );
    assert_eq!(h.driver.count("cancel_action"), 1);
    assert_eq!(h.driver.count("confirm_action"), 0);

    let history = h.gate.history(10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ApprovalStatus::TimedOut);
}

#[tokio::test]
async fn limit_violations_stop_before_the_portal() {
    let h = harness(Some(Arc::new(ApproveAll)));

    let task = h
        .orchestrator
        .process_intent(&payment_intent(100_000.0))
        .await;

    assert_eq!(task.status, TaskStatus::Failed);
    // The payment action itself never reached the driver.
    assert_eq!(h.driver.calls(), vec!["login", "navigate_to_pay_bills"]);

    let pay = task
        .steps
        .iter()
        .find(|step| step.action == StepAction::PayBill)
        .unwrap();
    assert_eq!(pay.status, TaskStatus::Failed);
    assert!(pay
        .error
        .as_ref()
        .unwrap()
        .contains("exceeds single transaction limit"));

    // The approval checkpoint was never reached.
    let confirm = task.steps.last().unwrap();
    assert_eq!(confirm.status, TaskStatus::Pending);
    assert!(h.gate.history(10).is_empty());

    let recent = h.orchestrator.metrics().recent_commands(1);
    assert!(!recent[0].success);
    assert_eq!(recent[0].approval_granted, None);
}

#[tokio::test]
async fn unparseable_commands_fail_without_touching_the_portal() {
    let h = harness(None);

    let task = h.orchestrator.process_intent(&intent("dance")).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.steps.len(), 1);
    assert_eq!(task.steps[0].action, StepAction::Error);
    assert_eq!(
        task.steps[0].error.as_deref(),
        Some("Could not understand the command. Please try rephrasing.")
    );
    assert!(h.driver.calls().is_empty());
    assert_eq!(h.events.count("task_completed"), 1);

    let recent = h.orchestrator.metrics().recent_commands(1);
    assert_eq!(recent[0].action, "unknown");
    assert!(!recent[0].success);
}

#[tokio::test]
async fn driver_errors_are_retried_then_surfaced_readably() {
    let h = harness(None);
    h.driver.fail_with("check_balance", "timeout loading page");

    let task = h.orchestrator.process_intent(&intent("check_balance")).await;

    assert_eq!(task.status, TaskStatus::Failed);
    // Initial attempt plus two remediated retries.
    assert_eq!(h.driver.count("check_balance"), 3);

    let step = task.steps.last().unwrap();
    assert_eq!(step.error.as_deref(), Some("The page took too long to load."));

    let history = h.recovery.history();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|attempt| attempt.kind == ErrorKind::SlowLoad && !attempt.success));
}

#[tokio::test]
async fn known_recipients_go_through_the_beneficiary_picker() {
    let h = harness(Some(Arc::new(ApproveAll)));
    let params: Params = [
        ("recipient".to_string(), json!("mom")),
        ("amount".to_string(), json!(2000)),
    ]
    .into_iter()
    .collect();
    let transfer =
        ParsedIntent::new("fund_transfer", params, 0.9).with_command("send 2000 to mom");

    let task = h.orchestrator.process_intent(&transfer).await;

    assert_eq!(task.status, TaskStatus::Completed);
    let select = task
        .steps
        .iter()
        .find(|step| step.action == StepAction::SelectBeneficiary)
        .expect("picker step for a known recipient");
    assert_eq!(select.parameters.get("name"), Some(&json!("Mom")));
    assert_eq!(
        h.driver.calls(),
        vec![
            "login",
            "navigate_to_fund_transfer",
            "select_beneficiary",
            "fund_transfer",
            "confirm_action"
        ]
    );
}

#[tokio::test]
async fn completed_payments_count_against_the_daily_allowance() {
    let h = harness(Some(Arc::new(ApproveAll)));

    let task = h
        .orchestrator
        .process_intent(&payment_intent(50_000.0))
        .await;

    assert_eq!(task.status, TaskStatus::Completed);
    let summary = h.limiter.usage_summary(ActionKind::PayBill).unwrap();
    assert_eq!(summary.usage.daily, 50_000.0);
    assert_eq!(summary.remaining.daily, Some(150_000.0));
}
