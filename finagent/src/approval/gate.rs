//! The approval gate that pauses execution before high-risk actions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;

use crate::approval::types::{ApprovalRequest, ApprovalStatus, DecisionPort};
use crate::config::ApprovalConfig;
use crate::events::TaskEventSink;
use crate::types::{ActionKind, Params, RiskLevel};
use crate::utils::format_inr;

struct PendingEntry {
    request: ApprovalRequest,
    decision_tx: Option<oneshot::Sender<ApprovalStatus>>,
    decision_rx: Option<oneshot::Receiver<ApprovalStatus>>,
}

#[derive(Default)]
struct GateState {
    pending: HashMap<String, PendingEntry>,
    history: Vec<ApprovalRequest>,
}

/// Human-in-the-loop approval gate.
///
/// Execution parks on [`ApprovalGate::wait_for_approval`] until the
/// decision port answers, someone calls [`ApprovalGate::approve`] /
/// [`ApprovalGate::reject`] out of band, or the timeout fires. A request
/// resolves exactly once; whichever decision lands first wins and later
/// ones read the recorded outcome.
pub struct ApprovalGate {
    timeout: Duration,
    decision_port: Option<Arc<dyn DecisionPort>>,
    events: Arc<dyn TaskEventSink>,
    state: Mutex<GateState>,
    request_counter: AtomicU64,
}

impl ApprovalGate {
    pub fn new(config: &ApprovalConfig, events: Arc<dyn TaskEventSink>) -> Self {
        ApprovalGate {
            timeout: config.timeout(),
            decision_port: None,
            events,
            state: Mutex::new(GateState::default()),
            request_counter: AtomicU64::new(0),
        }
    }

    /// Attach the frontend that answers requests. Without one, requests
    /// can only be resolved via [`ApprovalGate::approve`] and
    /// [`ApprovalGate::reject`].
    pub fn with_decision_port(mut self, port: Arc<dyn DecisionPort>) -> Self {
        self.decision_port = Some(port);
        self
    }

    /// Whether `action` must pass through the gate. Unknown action names
    /// do not require approval; they fail earlier, at intent parsing.
    pub fn requires_approval(&self, action: &str) -> bool {
        ActionKind::parse(action)
            .map(|kind| kind.requires_approval())
            .unwrap_or(false)
    }

    /// Register a new pending request and return it for display. The
    /// caller then parks on [`ApprovalGate::wait_for_approval`].
    pub fn request_approval(
        &self,
        action: &str,
        parameters: Params,
        screenshot: Option<String>,
    ) -> ApprovalRequest {
        let id = format!(
            "APR-{:04}",
            self.request_counter.fetch_add(1, Ordering::SeqCst) + 1
        );
        let risk_level = ActionKind::parse(action)
            .map(|kind| kind.risk_level())
            .unwrap_or(RiskLevel::High);

        let request = ApprovalRequest {
            id: id.clone(),
            action: action.to_string(),
            description: build_description(action, &parameters),
            parameters,
            risk_level,
            requested_at: Utc::now(),
            status: ApprovalStatus::Pending,
            screenshot,
        };

        log::info!(
            "approval required: {} {} ({}), risk {}",
            request.id,
            request.action,
            request.description,
            request.risk_level
        );

        let (decision_tx, decision_rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap();
        state.pending.insert(
            id,
            PendingEntry {
                request: request.clone(),
                decision_tx: Some(decision_tx),
                decision_rx: Some(decision_rx),
            },
        );

        request
    }

    /// Block until the request resolves. `timeout` overrides the
    /// configured default for this one wait.
    pub async fn wait_for_approval(
        &self,
        request: &ApprovalRequest,
        timeout: Option<Duration>,
    ) -> ApprovalStatus {
        let wait = timeout.unwrap_or(self.timeout);

        let rx = {
            let mut state = self.state.lock().unwrap();
            match state.pending.get_mut(&request.id) {
                Some(entry) => match entry.decision_rx.take() {
                    Some(rx) => rx,
                    None => {
                        log::warn!("approval {} already has a waiter", request.id);
                        return entry.request.status;
                    }
                },
                // Resolved before anyone waited: report the recorded outcome.
                None => {
                    return recorded_status(&state.history, &request.id)
                        .unwrap_or(request.status)
                }
            }
        };

        if let Some(port) = self.decision_port.clone() {
            tokio::select! {
                approved = port.decide(request) => {
                    let status = if approved {
                        ApprovalStatus::Approved
                    } else {
                        ApprovalStatus::Rejected
                    };
                    self.resolve(&request.id, status).await
                }
                outcome = rx => match outcome {
                    Ok(status) => status,
                    Err(_) => self.resolve(&request.id, ApprovalStatus::TimedOut).await,
                },
                _ = tokio::time::sleep(wait) => {
                    self.resolve(&request.id, ApprovalStatus::TimedOut).await
                }
            }
        } else {
            match tokio::time::timeout(wait, rx).await {
                Ok(Ok(status)) => status,
                Ok(Err(_)) => self.resolve(&request.id, ApprovalStatus::TimedOut).await,
                Err(_) => self.resolve(&request.id, ApprovalStatus::TimedOut).await,
            }
        }
    }

    /// Approve a pending request out of band. `true` iff this call
    /// performed the transition.
    pub async fn approve(&self, request_id: &str) -> bool {
        match self.transition(request_id, ApprovalStatus::Approved) {
            Some(request) => {
                self.events.approval_decided(&request).await;
                true
            }
            None => false,
        }
    }

    /// Reject a pending request out of band. `true` iff this call
    /// performed the transition.
    pub async fn reject(&self, request_id: &str) -> bool {
        match self.transition(request_id, ApprovalStatus::Rejected) {
            Some(request) => {
                self.events.approval_decided(&request).await;
                true
            }
            None => false,
        }
    }

    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let state = self.state.lock().unwrap();
        state
            .pending
            .values()
            .map(|entry| entry.request.clone())
            .collect()
    }

    /// The most recent `limit` resolved requests, oldest first.
    pub fn history(&self, limit: usize) -> Vec<ApprovalRequest> {
        let state = self.state.lock().unwrap();
        let skip = state.history.len().saturating_sub(limit);
        state.history[skip..].to_vec()
    }

    /// Resolve and report the final status. When another decision got
    /// there first, the recorded one is returned instead.
    async fn resolve(&self, id: &str, status: ApprovalStatus) -> ApprovalStatus {
        match self.transition(id, status) {
            Some(request) => {
                self.events.approval_decided(&request).await;
                request.status
            }
            None => {
                let state = self.state.lock().unwrap();
                recorded_status(&state.history, id).unwrap_or(status)
            }
        }
    }

    /// Move a request from pending to history under one lock, waking any
    /// parked waiter. `None` when the request is not pending.
    fn transition(&self, id: &str, status: ApprovalStatus) -> Option<ApprovalRequest> {
        let mut state = self.state.lock().unwrap();
        let mut entry = state.pending.remove(id)?;
        entry.request.status = status;
        let request = entry.request.clone();
        state.history.push(request.clone());
        if let Some(tx) = entry.decision_tx.take() {
            let _ = tx.send(status);
        }
        log::info!("approval {}: {}", request.id, request.status);
        Some(request)
    }
}

fn recorded_status(history: &[ApprovalRequest], id: &str) -> Option<ApprovalStatus> {
    history
        .iter()
        .rev()
        .find(|request| request.id == id)
        .map(|request| request.status)
}

/// Human-readable summary of what the user is being asked to allow.
fn build_description(action: &str, params: &Params) -> String {
    let amount = params
        .get("amount")
        .and_then(|value| value.as_f64())
        .unwrap_or(0.0);

    match ActionKind::parse(action) {
        Some(ActionKind::PayBill) => {
            let biller = params
                .get("biller")
                .or_else(|| params.get("biller_name"))
                .and_then(|value| value.as_str())
                .unwrap_or("Unknown Biller");
            format!("Pay ₹{} to {}", format_inr(amount), biller)
        }
        Some(ActionKind::FundTransfer) => {
            let recipient = params
                .get("recipient")
                .and_then(|value| value.as_str())
                .unwrap_or("Unknown");
            format!("Transfer ₹{} to {}", format_inr(amount), recipient)
        }
        Some(ActionKind::BuyGold) => {
            match params.get("grams").and_then(|value| value.as_f64()) {
                Some(grams) if grams > 0.0 => {
                    format!("Purchase {:.3} grams of Digital Gold", grams)
                }
                _ => format!("Purchase ₹{} worth of Digital Gold", format_inr(amount)),
            }
        }
        Some(ActionKind::UpdateProfile) => "Update profile information".to_string(),
        _ => format!("Execute {} action", action),
    }
}
