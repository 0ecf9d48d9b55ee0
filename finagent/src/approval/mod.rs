//! Human-in-the-loop approval before high-risk actions.
//!
//! Monetary actions and profile changes never execute on the agent's own
//! authority: the orchestrator inserts a confirmation step that parks on
//! [`ApprovalGate::wait_for_approval`] until a human answers or the
//! timeout cancels the action.

pub mod gate;
pub mod types;

pub use gate::ApprovalGate;
pub use types::{ApprovalRequest, ApprovalStatus, DecisionPort};
