//! Tiered error recovery.
//!
//! Portal automation fails in predictable ways: pages load slowly,
//! elements move, sessions expire, CAPTCHAs appear, accounts get locked.
//! This module classifies failures by keyword and handles each class at
//! the right tier instead of blindly retrying everything:
//!
//! ```text
//! failure message
//!       │ classify()
//!       ▼
//! ┌─────────────┬──────────────────┬───────────────────┐
//! │ tier: auto  │ tier: user       │ tier: abort       │
//! │ remediate + │ prompt the user, │ stop immediately, │
//! │ retry up to │ retry on a       │ translate for     │
//! │ the cap     │ response         │ display           │
//! └─────────────┴──────────────────┴───────────────────┘
//! ```
//!
//! Terminal failures carry a [`UserError`] so callers never have to show
//! a raw driver message to a person.

mod engine;
mod types;
pub mod user_errors;

pub use engine::{ErrorRecoveryEngine, UserInputPort};
pub use types::{
    ErrorContext, ErrorKind, KindStats, RecoveryAttempt, RecoveryError, RecoveryStats,
    RecoveryTier,
};
pub use user_errors::{ErrorCategory, UserError};
