//! Session-level performance counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_RECORDS: usize = 1000;

/// Outcome of one processed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: usize,
    pub approval_required: bool,
    /// `None` when the command never reached the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_granted: Option<bool>,
}

/// One external model/API attempt as seen by the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-session counters and bounded record logs. Counter updates are
/// lock-free; the record lists keep the most recent [`MAX_RECORDS`].
#[derive(Debug)]
pub struct SessionMetrics {
    started_at: DateTime<Utc>,
    total_commands: AtomicU64,
    successful_commands: AtomicU64,
    failed_commands: AtomicU64,
    approvals_requested: AtomicU64,
    approvals_granted: AtomicU64,
    approvals_denied: AtomicU64,
    api_calls: AtomicU64,
    api_calls_success: AtomicU64,
    api_calls_failed: AtomicU64,
    api_latency_ms: AtomicU64,
    commands: Mutex<Vec<CommandRecord>>,
    api_log: Mutex<Vec<ApiCallRecord>>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        SessionMetrics {
            started_at: Utc::now(),
            total_commands: AtomicU64::new(0),
            successful_commands: AtomicU64::new(0),
            failed_commands: AtomicU64::new(0),
            approvals_requested: AtomicU64::new(0),
            approvals_granted: AtomicU64::new(0),
            approvals_denied: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            api_calls_success: AtomicU64::new(0),
            api_calls_failed: AtomicU64::new(0),
            api_latency_ms: AtomicU64::new(0),
            commands: Mutex::new(Vec::new()),
            api_log: Mutex::new(Vec::new()),
        }
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        SessionMetrics::default()
    }

    pub fn record_command(&self, record: CommandRecord) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
        if record.success {
            self.successful_commands.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_commands.fetch_add(1, Ordering::Relaxed);
        }

        let mut commands = self.commands.lock().unwrap();
        commands.push(record);
        if commands.len() > MAX_RECORDS {
            let excess = commands.len() - MAX_RECORDS;
            commands.drain(..excess);
        }
    }

    pub fn record_approval(&self, granted: bool) {
        self.approvals_requested.fetch_add(1, Ordering::Relaxed);
        if granted {
            self.approvals_granted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.approvals_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_api_call(
        &self,
        provider: &str,
        model: &str,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.api_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.api_latency_ms.fetch_add(duration_ms, Ordering::Relaxed);

        let mut api_log = self.api_log.lock().unwrap();
        api_log.push(ApiCallRecord {
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            duration_ms,
            success,
            error,
        });
        if api_log.len() > MAX_RECORDS {
            let excess = api_log.len() - MAX_RECORDS;
            api_log.drain(..excess);
        }
    }

    /// The most recent `limit` commands, newest first.
    pub fn recent_commands(&self, limit: usize) -> Vec<CommandRecord> {
        let commands = self.commands.lock().unwrap();
        commands.iter().rev().take(limit).cloned().collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let total = self.total_commands.load(Ordering::Relaxed);
        let successful = self.successful_commands.load(Ordering::Relaxed);
        let api_total = self.api_calls.load(Ordering::Relaxed);
        let api_success = self.api_calls_success.load(Ordering::Relaxed);

        let avg_duration_ms = {
            let commands = self.commands.lock().unwrap();
            if commands.is_empty() {
                0.0
            } else {
                let sum: u64 = commands.iter().map(|c| c.duration_ms).sum();
                round2(sum as f64 / commands.len() as f64)
            }
        };

        MetricsSummary {
            started_at: self.started_at,
            session_seconds: (Utc::now() - self.started_at).num_seconds(),
            commands: CommandTotals {
                total,
                successful,
                failed: self.failed_commands.load(Ordering::Relaxed),
                success_rate: percent(successful, total),
                avg_duration_ms,
            },
            approvals: ApprovalTotals {
                requested: self.approvals_requested.load(Ordering::Relaxed),
                granted: self.approvals_granted.load(Ordering::Relaxed),
                denied: self.approvals_denied.load(Ordering::Relaxed),
            },
            api: ApiTotals {
                total_calls: api_total,
                successful: api_success,
                failed: self.api_calls_failed.load(Ordering::Relaxed),
                success_rate: percent(api_success, api_total),
                average_latency_ms: if api_total > 0 {
                    round2(self.api_latency_ms.load(Ordering::Relaxed) as f64 / api_total as f64)
                } else {
                    0.0
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTotals {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percent, two decimals.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTotals {
    pub requested: u64,
    pub granted: u64,
    pub denied: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTotals {
    pub total_calls: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percent, two decimals.
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub started_at: DateTime<Utc>,
    pub session_seconds: i64,
    pub commands: CommandTotals,
    pub approvals: ApprovalTotals,
    pub api: ApiTotals,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
