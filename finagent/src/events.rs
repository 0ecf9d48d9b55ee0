//! Task lifecycle notifications.
//!
//! The orchestrator reports progress through a [`TaskEventSink`] so that
//! UIs, chat frontends and tests can observe execution without the core
//! knowing about any of them. All methods have no-op defaults; sinks
//! override only what they care about.

use crate::approval::ApprovalRequest;
use crate::types::{Task, TaskStep};

#[async_trait::async_trait]
pub trait TaskEventSink: Send + Sync {
    /// A step is about to execute.
    async fn step_started(&self, _task: &Task, _step: &TaskStep) {}

    /// A step finished successfully.
    async fn step_completed(&self, _task: &Task, _step: &TaskStep) {}

    /// A conscious-pause checkpoint was reached and a decision is needed.
    async fn approval_needed(&self, _request: &ApprovalRequest) {}

    /// A pending approval request reached a terminal status.
    async fn approval_decided(&self, _request: &ApprovalRequest) {}

    /// The task reached a terminal status. Fired exactly once per task.
    async fn task_completed(&self, _task: &Task) {}
}

/// Sink that ignores every event.
pub struct NoopEvents;

#[async_trait::async_trait]
impl TaskEventSink for NoopEvents {}
