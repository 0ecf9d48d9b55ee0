use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Datelike, Duration, NaiveDate, Utc};

use crate::types::ActionKind;
use crate::utils::format_inr;

use super::types::{
    default_limits, LimitCheckResult, LimitConfig, LimitKind, RemainingLimits, RemainingWindows,
    TransactionRecord, UsageSummary, UsageWindows,
};

/// Ledger entries kept after a trim.
const MAX_LEDGER_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy)]
enum Window {
    Daily,
    Weekly,
    Monthly,
}

/// Transaction limit enforcement with calendar-window usage tracking.
///
/// Caps are checked in a fixed order (single, daily, weekly, monthly) and
/// the first violation wins. Usage windows are calendar-anchored: daily is
/// the current date, weekly runs from the most recent Monday, monthly is
/// the current calendar month. Only successful transactions count toward
/// usage; failed ones are kept in the ledger for audit but never consume
/// headroom.
pub struct TransactionLimiter {
    limits: Mutex<HashMap<ActionKind, LimitConfig>>,
    ledger: Mutex<Vec<TransactionRecord>>,
}

impl Default for TransactionLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLimiter {
    pub fn new() -> Self {
        TransactionLimiter {
            limits: Mutex::new(default_limits()),
            ledger: Mutex::new(Vec::new()),
        }
    }

    /// Overlay custom caps on the defaults.
    pub fn with_limits(self, overrides: HashMap<ActionKind, LimitConfig>) -> Self {
        {
            let mut limits = self.limits.lock().unwrap();
            for (action, config) in overrides {
                limits.insert(action, config);
            }
        }
        self
    }

    pub fn set_limit(&self, action: ActionKind, config: LimitConfig) {
        self.limits.lock().unwrap().insert(action, config);
    }

    /// Check whether `amount` may be spent under `action` right now.
    pub fn check(&self, action: ActionKind, amount: f64) -> LimitCheckResult {
        let config = {
            let limits = self.limits.lock().unwrap();
            match limits.get(&action) {
                Some(config) => config.clone(),
                // No caps configured for this action
                None => return LimitCheckResult::unlimited(),
            }
        };
        let ledger = self.ledger.lock().unwrap();

        if config.single_limit > 0.0 && amount > config.single_limit {
            return LimitCheckResult {
                allowed: false,
                reason: Some(format!(
                    "Amount ₹{} exceeds single transaction limit of ₹{}",
                    format_inr(amount),
                    format_inr(config.single_limit)
                )),
                limit_kind: Some(LimitKind::Single),
                limit_value: Some(config.single_limit),
                current_usage: Some(amount),
                remaining: Some(0.0),
                requires_2fa: false,
            };
        }

        if config.daily_limit > 0.0 {
            let daily_usage = window_usage(&ledger, action, Window::Daily);
            if daily_usage + amount > config.daily_limit {
                return LimitCheckResult {
                    allowed: false,
                    reason: Some(format!(
                        "Daily limit would be exceeded. Used: ₹{}, Limit: ₹{}",
                        format_inr(daily_usage),
                        format_inr(config.daily_limit)
                    )),
                    limit_kind: Some(LimitKind::Daily),
                    limit_value: Some(config.daily_limit),
                    current_usage: Some(daily_usage),
                    remaining: Some((config.daily_limit - daily_usage).max(0.0)),
                    requires_2fa: false,
                };
            }
        }

        if let Some(weekly_limit) = config.weekly_limit.filter(|l| *l > 0.0) {
            let weekly_usage = window_usage(&ledger, action, Window::Weekly);
            if weekly_usage + amount > weekly_limit {
                return LimitCheckResult {
                    allowed: false,
                    reason: Some(format!(
                        "Weekly limit would be exceeded. Used: ₹{}, Limit: ₹{}",
                        format_inr(weekly_usage),
                        format_inr(weekly_limit)
                    )),
                    limit_kind: Some(LimitKind::Weekly),
                    limit_value: Some(weekly_limit),
                    current_usage: Some(weekly_usage),
                    remaining: Some((weekly_limit - weekly_usage).max(0.0)),
                    requires_2fa: false,
                };
            }
        }

        if let Some(monthly_limit) = config.monthly_limit.filter(|l| *l > 0.0) {
            let monthly_usage = window_usage(&ledger, action, Window::Monthly);
            if monthly_usage + amount > monthly_limit {
                return LimitCheckResult {
                    allowed: false,
                    reason: Some(format!(
                        "Monthly limit would be exceeded. Used: ₹{}, Limit: ₹{}",
                        format_inr(monthly_usage),
                        format_inr(monthly_limit)
                    )),
                    limit_kind: Some(LimitKind::Monthly),
                    limit_value: Some(monthly_limit),
                    current_usage: Some(monthly_usage),
                    remaining: Some((monthly_limit - monthly_usage).max(0.0)),
                    requires_2fa: false,
                };
            }
        }

        let daily_usage = window_usage(&ledger, action, Window::Daily);
        let requires_2fa = config
            .requires_2fa_above
            .map_or(false, |threshold| amount > threshold);

        LimitCheckResult {
            allowed: true,
            reason: None,
            limit_kind: Some(LimitKind::Single),
            limit_value: Some(config.single_limit),
            current_usage: Some(daily_usage),
            remaining: if config.daily_limit > 0.0 {
                Some(config.daily_limit - daily_usage)
            } else {
                None
            },
            requires_2fa,
        }
    }

    /// Append a transaction outcome to the ledger, trimming it to the most
    /// recent entries.
    pub fn record(&self, action: ActionKind, amount: f64, success: bool) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.push(TransactionRecord {
            action,
            amount,
            timestamp: Utc::now(),
            success,
        });
        if ledger.len() > MAX_LEDGER_ENTRIES {
            let excess = ledger.len() - MAX_LEDGER_ENTRIES;
            ledger.drain(..excess);
        }
        log::debug!(
            "recorded {} ₹{} (success: {})",
            action,
            format_inr(amount),
            success
        );
    }

    /// Snapshot of the ledger, oldest first.
    pub fn ledger(&self) -> Vec<TransactionRecord> {
        self.ledger.lock().unwrap().clone()
    }

    /// Replace the ledger wholesale, e.g. from a persisted snapshot.
    pub fn restore_ledger(&self, records: Vec<TransactionRecord>) {
        *self.ledger.lock().unwrap() = records;
    }

    /// Headroom left for an action, `None` if it has no configured caps.
    pub fn remaining_limits(&self, action: ActionKind) -> Option<RemainingLimits> {
        let config = self.limits.lock().unwrap().get(&action).cloned()?;
        let ledger = self.ledger.lock().unwrap();

        Some(RemainingLimits {
            single: config.single_limit,
            daily_remaining: if config.daily_limit > 0.0 {
                Some((config.daily_limit - window_usage(&ledger, action, Window::Daily)).max(0.0))
            } else {
                None
            },
            weekly_remaining: config.weekly_limit.filter(|l| *l > 0.0).map(|limit| {
                (limit - window_usage(&ledger, action, Window::Weekly)).max(0.0)
            }),
            monthly_remaining: config.monthly_limit.filter(|l| *l > 0.0).map(|limit| {
                (limit - window_usage(&ledger, action, Window::Monthly)).max(0.0)
            }),
        })
    }

    /// Usage, headroom and utilization across all windows.
    pub fn usage_summary(&self, action: ActionKind) -> Option<UsageSummary> {
        let config = self.limits.lock().unwrap().get(&action).cloned()?;
        let ledger = self.ledger.lock().unwrap();

        let daily = window_usage(&ledger, action, Window::Daily);
        let weekly = window_usage(&ledger, action, Window::Weekly);
        let monthly = window_usage(&ledger, action, Window::Monthly);

        let weekly_limit = config.weekly_limit.filter(|l| *l > 0.0);
        let monthly_limit = config.monthly_limit.filter(|l| *l > 0.0);

        Some(UsageSummary {
            action,
            usage: UsageWindows {
                daily,
                weekly,
                monthly,
            },
            remaining: RemainingWindows {
                daily: if config.daily_limit > 0.0 {
                    Some((config.daily_limit - daily).max(0.0))
                } else {
                    None
                },
                weekly: weekly_limit.map(|l| (l - weekly).max(0.0)),
                monthly: monthly_limit.map(|l| (l - monthly).max(0.0)),
            },
            utilization: UsageWindows {
                daily: if config.daily_limit > 0.0 {
                    daily / config.daily_limit * 100.0
                } else {
                    0.0
                },
                weekly: weekly_limit.map_or(0.0, |l| weekly / l * 100.0),
                monthly: monthly_limit.map_or(0.0, |l| monthly / l * 100.0),
            },
            limits: config,
        })
    }

    /// Drop today's ledger entries, either for one action or for all.
    pub fn reset_daily_usage(&self, action: Option<ActionKind>) {
        let today = Utc::now().date_naive();
        self.ledger.lock().unwrap().retain(|tx| {
            tx.timestamp.date_naive() != today || action.map_or(false, |a| tx.action != a)
        });
    }
}

/// Render a check verdict for display.
pub fn format_limit_message(result: &LimitCheckResult) -> String {
    if result.allowed {
        let remaining = format_inr(result.remaining.unwrap_or(0.0));
        if result.requires_2fa {
            format!(
                "✅ Transaction allowed (₹{} remaining today). ⚠️ 2FA required for this amount.",
                remaining
            )
        } else {
            format!("✅ Transaction allowed. Remaining daily limit: ₹{}", remaining)
        }
    } else {
        format!("❌ {}", result.reason.as_deref().unwrap_or("Not allowed"))
    }
}

fn window_usage(ledger: &[TransactionRecord], action: ActionKind, window: Window) -> f64 {
    let today = Utc::now().date_naive();
    ledger
        .iter()
        .filter(|tx| tx.action == action && tx.success)
        .filter(|tx| in_window(tx.timestamp.date_naive(), today, window))
        .map(|tx| tx.amount)
        .sum()
}

fn in_window(tx_date: NaiveDate, today: NaiveDate, window: Window) -> bool {
    match window {
        Window::Daily => tx_date == today,
        Window::Weekly => {
            let week_start =
                today - Duration::days(today.weekday().num_days_from_monday() as i64);
            tx_date >= week_start
        }
        Window::Monthly => tx_date.year() == today.year() && tx_date.month() == today.month(),
    }
}
