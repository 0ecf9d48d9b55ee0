//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by drivers, providers and the orchestration layer.
///
/// Driver and provider variants render as their bare message text: the
/// recovery engine classifies failures by keyword, so the text must reach
/// it unwrapped.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The page driver failed to carry out an action.
    #[error("{0}")]
    Driver(String),

    /// A vision/LLM provider call failed.
    #[error("{0}")]
    Provider(String),

    /// An intent named an action outside the registered action set.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}
