//! Vision-model integration.
//!
//! ```text
//! ElementResolver ──► ElementCache (hit? done)
//!        │ miss
//!        ▼
//! KeyRotatingClient ──► VisionProvider (rotates credentials on 429,
//!        │                              falls back across models)
//!        ▼
//! types::extract_json ──► ElementLocation / PageAnalysis / ...
//! ```
//!
//! The resolver is the only entry point the rest of the agent uses; the
//! client and the reply types are exported for custom providers and
//! status reporting.

mod client;
mod resolver;
mod types;

pub use client::{ClientMetrics, ClientMetricsSummary, KeyRotatingClient, VisionProvider};
pub use resolver::ElementResolver;
pub use types::{extract_json, ActionVerification, ElementLocation, PageAnalysis};
