//! Agent configuration.
//!
//! All sections have working defaults so `AgentConfig::default()` is a
//! fully usable configuration. A TOML file only needs to spell out the
//! fields it overrides.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::LimitConfig;
use crate::types::ActionKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub orchestrator: OrchestratorConfig,
    pub approval: ApprovalConfig,
    pub recovery: RecoveryConfig,
    pub cache: CacheConfig,
    pub vision: VisionConfig,
    /// Per-action overrides of the built-in transaction limits.
    pub limits: HashMap<ActionKind, LimitConfig>,
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Task execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause between consecutive steps, for page settling and visibility.
    pub step_delay_ms: u64,
    /// Credentials used by the implicit login step.
    pub login_username: String,
    pub login_password: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 500,
            login_username: "demo_user".to_string(),
            login_password: "demo123".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

/// Conscious-pause settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// How long a pending request waits for a decision before timing out.
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Error recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Retry cap for automatically recoverable failures.
    pub max_retries: u32,
    /// Wait before retrying after a slow page load.
    pub slow_load_delay_ms: u64,
    /// Wait before re-locating an element that was not found.
    pub element_retry_delay_ms: u64,
    /// Wait before retrying after a network error.
    pub network_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            slow_load_delay_ms: 3000,
            element_retry_delay_ms: 1000,
            network_delay_ms: 5000,
        }
    }
}

impl RecoveryConfig {
    pub fn slow_load_delay(&self) -> Duration {
        Duration::from_millis(self.slow_load_delay_ms)
    }

    pub fn element_retry_delay(&self) -> Duration {
        Duration::from_millis(self.element_retry_delay_ms)
    }

    pub fn network_delay(&self) -> Duration {
        Duration::from_millis(self.network_delay_ms)
    }
}

/// Element cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
    /// Maximum number of cached elements before eviction.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            max_entries: 500,
        }
    }
}

/// Vision provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Provider name, recorded with call metrics.
    pub provider: String,
    /// Credential pool rotated through on rate limits. May be empty for
    /// providers that need no key.
    pub api_keys: Vec<String>,
    /// Model preference list. The first entry is used until reported
    /// unavailable, then the next takes over.
    pub models: Vec<String>,
    /// Base delay of the exponential backoff.
    pub base_delay_ms: u64,
    /// Backoff ceiling before jitter.
    pub max_delay_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            api_keys: Vec::new(),
            models: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
            ],
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl VisionConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_complete() {
        let config = AgentConfig::default();
        assert_eq!(config.approval.timeout_secs, 60);
        assert_eq!(config.recovery.max_retries, 3);
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.vision.models.len(), 2);
        assert!(config.limits.is_empty());
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            [approval]
            timeout_secs = 5

            [vision]
            api_keys = ["k1", "k2"]

            [limits.pay_bill]
            single_limit = 5000.0
            daily_limit = 20000.0
            "#,
        )
        .unwrap();
        assert_eq!(config.approval.timeout_secs, 5);
        assert_eq!(config.recovery.max_retries, 3);
        assert_eq!(config.vision.api_keys, vec!["k1", "k2"]);
        let pay_bill = config.limits.get(&ActionKind::PayBill).unwrap();
        assert_eq!(pay_bill.single_limit, 5000.0);
        assert_eq!(pay_bill.weekly_limit, None);
    }

    #[test]
    fn load_reads_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "[orchestrator]\nstep_delay_ms = 0\n\n[recovery]\nmax_retries = 1\n",
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.orchestrator.step_delay_ms, 0);
        assert_eq!(config.recovery.max_retries, 1);
        assert_eq!(config.approval.timeout_secs, 60);
    }

    #[test]
    fn a_missing_file_is_an_io_error() {
        let err = AgentConfig::load("/nonexistent/agent.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
