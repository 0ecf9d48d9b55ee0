//! Page driver port.
//!
//! The orchestration core never touches a browser directly. Everything it
//! does to the portal goes through this trait, so automation backends can
//! be swapped and tests can run against scripted fakes.

use crate::error::AgentError;
use crate::types::{ActionResult, Params, StepAction};

#[async_trait::async_trait]
pub trait PortalDriver: Send + Sync {
    /// Execute one step action against the portal.
    ///
    /// A `Ok(result)` with `success == false` is a business-level failure
    /// (e.g. the portal refused the transfer); an `Err` is a mechanical
    /// failure whose message text feeds the recovery classifier.
    async fn execute(&self, action: StepAction, parameters: &Params)
        -> Result<ActionResult, AgentError>;

    /// Whether a portal session is currently established.
    fn is_authenticated(&self) -> bool;

    /// Capture the current page, returning an opaque screenshot reference.
    /// Drivers that cannot capture return `None`.
    async fn take_screenshot(&self) -> Option<String>;
}
