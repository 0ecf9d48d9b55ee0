// FinAgent Library
// Automation safety core for financial web portals

// Core domain types and configuration
pub mod config;
pub mod error;
pub mod types;

// Safety components
pub mod approval;
pub mod limits;
pub mod recovery;

// Page interaction stack
pub mod driver;
pub mod element_cache;
pub mod vision;

// Orchestration
pub mod events;
pub mod metrics;
pub mod orchestrator;

// Utilities
pub mod utils;

// Re-export the main entry points
pub use crate::error::AgentError;
pub use crate::orchestrator::TaskOrchestrator;
pub use crate::types::{
    ActionKind, ActionResult, Params, ParsedIntent, RiskLevel, StepAction, Task, TaskStatus,
    TaskStep,
};
