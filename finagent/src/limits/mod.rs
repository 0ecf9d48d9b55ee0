//! Transaction limit enforcement.
//!
//! Monetary actions pass through a cap check before they execute, so a
//! runaway plan can never move more money than policy allows. Every
//! completed transaction lands in a rolling ledger; cumulative caps are
//! computed from it over calendar windows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 TransactionLimiter                    │
//! │  ┌──────────────────┐      ┌───────────────────────┐ │
//! │  │ per-action caps  │      │ rolling ledger        │ │
//! │  │ single / daily / │      │ (last 1000 records,   │ │
//! │  │ weekly / monthly │      │  success + failure)   │ │
//! │  └──────────────────┘      └───────────────────────┘ │
//! │            │                        │                 │
//! │            └──────► check() ◄───────┘                 │
//! │          first violated cap wins, in order            │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use finagent::limits::TransactionLimiter;
//! use finagent::ActionKind;
//!
//! let limiter = TransactionLimiter::new();
//!
//! let check = limiter.check(ActionKind::PayBill, 1_250.0);
//! if !check.allowed {
//!     return Err(check.reason.unwrap_or_default());
//! }
//! if check.requires_2fa {
//!     log::info!("secondary verification advised");
//! }
//!
//! // After the transfer settles
//! limiter.record(ActionKind::PayBill, 1_250.0, true);
//! ```

mod tracker;
mod types;

pub use tracker::{format_limit_message, TransactionLimiter};
pub use types::{
    default_limits, LimitCheckResult, LimitConfig, LimitKind, RemainingLimits, RemainingWindows,
    TransactionRecord, UsageSummary, UsageWindows,
};
