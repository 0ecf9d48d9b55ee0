use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::time::sleep;

use crate::config::RecoveryConfig;
use crate::driver::PortalDriver;
use crate::error::AgentError;
use crate::types::{Params, StepAction};
use crate::vision::ElementResolver;

use super::types::{
    ErrorContext, ErrorKind, KindStats, RecoveryAttempt, RecoveryError, RecoveryStats,
    RecoveryTier,
};
use super::user_errors;

/// Keyword table driving classification, checked in order. The kind with
/// the most keyword hits wins; on a tie the earlier entry is kept.
const ERROR_KEYWORDS: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::SlowLoad, &["timeout", "loading", "slow", "network"]),
    (
        ErrorKind::ElementNotFound,
        &["not found", "element", "selector", "locate"],
    ),
    (
        ErrorKind::PopupInterrupt,
        &["popup", "modal", "dialog", "overlay"],
    ),
    (
        ErrorKind::SessionTimeout,
        &["session", "expired", "login", "authenticate"],
    ),
    (
        ErrorKind::InvalidAmount,
        &["invalid", "amount", "format", "number"],
    ),
    (
        ErrorKind::InsufficientBalance,
        &["insufficient", "balance", "funds", "low"],
    ),
    (
        ErrorKind::CaptchaRequired,
        &["captcha", "verify", "robot", "human"],
    ),
    (
        ErrorKind::OtpRequired,
        &["otp", "verification code", "sms", "2fa"],
    ),
    (
        ErrorKind::AccountLocked,
        &["locked", "blocked", "suspended", "disabled"],
    ),
    (
        ErrorKind::SecurityBlock,
        &["security", "fraud", "suspicious", "unusual"],
    ),
];

/// Channel through which tier-2 recovery asks the user for help.
#[async_trait::async_trait]
pub trait UserInputPort: Send + Sync {
    /// Present a prompt and wait for the user's response. `None` or an
    /// empty string means no help arrived.
    async fn request_input(&self, prompt: &str) -> Option<String>;
}

/// Tiered error recovery around fallible portal operations.
///
/// Failures are classified by keyword into a tier: auto-recoverable ones
/// are remediated and retried up to a cap, user-recoverable ones retry
/// once the user responds, and abort-tier ones fail immediately. The
/// engine works without a driver, resolver or input port; the mitigations
/// that need a missing collaborator degrade to a plain delayed retry.
pub struct ErrorRecoveryEngine {
    config: RecoveryConfig,
    driver: Option<Arc<dyn PortalDriver>>,
    resolver: Option<Arc<ElementResolver>>,
    input_port: Option<Arc<dyn UserInputPort>>,
    history: Mutex<Vec<RecoveryAttempt>>,
}

impl ErrorRecoveryEngine {
    pub fn new(config: RecoveryConfig) -> Self {
        ErrorRecoveryEngine {
            config,
            driver: None,
            resolver: None,
            input_port: None,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn PortalDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<ElementResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_input_port(mut self, port: Arc<dyn UserInputPort>) -> Self {
        self.input_port = Some(port);
        self
    }

    /// Classify an error message into kind, tier and recoverability.
    pub fn classify(&self, error_message: &str, action: &str) -> ErrorContext {
        let error_lower = error_message.to_lowercase();

        let mut detected = ErrorKind::CriticalFailure;
        let mut max_matches = 0usize;
        for &(kind, keywords) in ERROR_KEYWORDS {
            let mut matches = 0usize;
            for keyword in keywords {
                if error_lower.contains(keyword) {
                    matches += 1;
                }
            }
            if matches > max_matches {
                max_matches = matches;
                detected = kind;
            }
        }

        let tier = detected.tier();
        ErrorContext {
            kind: detected,
            tier,
            message: error_message.to_string(),
            action: action.to_string(),
            retry_count: 0,
            max_retries: self.config.max_retries,
            can_recover: tier != RecoveryTier::Abort,
            user_message: None,
        }
    }

    /// Run `operation` with tiered recovery.
    ///
    /// The loop makes at most `max_retries + 1` operation attempts
    /// (defaulting the cap from config). Abort-tier failures return
    /// immediately with the attempt count untouched; exceeding the cap
    /// reclassifies the failure as [`ErrorKind::MaxRetriesExceeded`].
    pub async fn with_recovery<T, F, Fut>(
        &self,
        mut operation: F,
        action_name: &str,
        max_retries: Option<u32>,
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, AgentError>> + Send,
        T: Send,
    {
        let cap = max_retries.unwrap_or(self.config.max_retries);
        let mut attempts: u32 = 0;
        let mut remediated: Option<ErrorKind> = None;

        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => {
                    if let Some(kind) = remediated {
                        self.push_attempt(kind, attempts - 1, true, "Recovery successful");
                        log::info!("{} recovered on attempt {}", action_name, attempts);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let message = err.to_string();
                    if let Some(kind) = remediated {
                        self.push_attempt(kind, attempts - 1, false, &message);
                    }

                    let mut context = self.classify(&message, action_name);
                    context.retry_count = attempts - 1;
                    context.max_retries = cap;
                    log::warn!(
                        "{} failed ({}, tier {}): {}",
                        action_name,
                        context.kind,
                        context.tier,
                        message
                    );

                    if context.tier == RecoveryTier::Abort {
                        return Err(self.final_error(context, attempts));
                    }
                    if attempts > cap {
                        context.kind = ErrorKind::MaxRetriesExceeded;
                        context.tier = RecoveryTier::Abort;
                        context.can_recover = false;
                        return Err(self.final_error(context, attempts));
                    }

                    if context.tier == RecoveryTier::User {
                        if !self.request_user_help(&mut context).await {
                            context.tier = RecoveryTier::Abort;
                            context.can_recover = false;
                            return Err(self.final_error(context, attempts));
                        }
                    } else {
                        self.auto_remediate(&context).await;
                    }
                    remediated = Some(context.kind);
                }
            }
        }
    }

    /// Tier-1 mitigation before the next retry.
    async fn auto_remediate(&self, context: &ErrorContext) {
        match context.kind {
            ErrorKind::SlowLoad => {
                log::info!("waiting for page to load");
                sleep(self.config.slow_load_delay()).await;
            }
            ErrorKind::ElementNotFound => {
                log::info!("re-analyzing page before retry");
                sleep(self.config.element_retry_delay()).await;
                if let (Some(driver), Some(resolver)) = (&self.driver, &self.resolver) {
                    if let Some(screenshot) = driver.take_screenshot().await {
                        match resolver.analyze_page(&screenshot).await {
                            Ok(analysis) => log::info!(
                                "page '{}' has {} visible element(s)",
                                analysis.page_type,
                                analysis.elements.len()
                            ),
                            Err(err) => log::debug!("page re-analysis failed: {}", err),
                        }
                    }
                }
            }
            ErrorKind::PopupInterrupt => {
                log::info!("attempting to dismiss popup");
                if let Some(driver) = &self.driver {
                    if let Err(err) = driver.execute(StepAction::DismissModal, &Params::new()).await
                    {
                        log::debug!("popup dismissal failed: {}", err);
                    }
                }
            }
            ErrorKind::SessionTimeout => {
                log::info!("session expired, re-authenticating");
                if let Some(driver) = &self.driver {
                    if let Err(err) = driver.execute(StepAction::Login, &Params::new()).await {
                        log::debug!("re-login failed: {}", err);
                    }
                }
            }
            ErrorKind::NetworkError => {
                log::info!("network issue, waiting before retry");
                sleep(self.config.network_delay()).await;
            }
            _ => {}
        }
    }

    /// Tier-2: surface a prompt and wait for the user. Returns whether a
    /// usable response arrived.
    async fn request_user_help(&self, context: &mut ErrorContext) -> bool {
        let prompt = user_prompt(context.kind, &context.message);
        context.user_message = Some(prompt.clone());

        match &self.input_port {
            Some(port) => match port.request_input(&prompt).await {
                Some(response) if !response.is_empty() => {
                    log::info!("user responded, retrying {}", context.action);
                    true
                }
                _ => {
                    log::warn!("no user response for {}", context.action);
                    false
                }
            },
            None => {
                log::warn!("user intervention needed but no input port wired: {}", prompt);
                false
            }
        }
    }

    fn final_error(&self, context: ErrorContext, attempts: u32) -> RecoveryError {
        let user_error = user_errors::translate(&context.message);
        log::error!(
            "{} aborted after {} attempt(s): {} ({})",
            context.action,
            attempts,
            context.message,
            context.kind
        );
        RecoveryError {
            kind: context.kind,
            tier: context.tier,
            user_error,
            attempts,
            message: context.message,
        }
    }

    fn push_attempt(&self, kind: ErrorKind, attempt_number: u32, success: bool, message: &str) {
        self.history.lock().unwrap().push(RecoveryAttempt {
            kind,
            attempt_number,
            timestamp: Utc::now(),
            success,
            message: message.to_string(),
        });
    }

    /// Snapshot of remediated retries, oldest first.
    pub fn history(&self) -> Vec<RecoveryAttempt> {
        self.history.lock().unwrap().clone()
    }

    pub fn stats(&self) -> RecoveryStats {
        let history = self.history.lock().unwrap();
        let total = history.len();
        let successful = history.iter().filter(|a| a.success).count();

        let mut by_kind: HashMap<ErrorKind, KindStats> = HashMap::new();
        for attempt in history.iter() {
            let entry = by_kind.entry(attempt.kind).or_default();
            entry.total += 1;
            if attempt.success {
                entry.success += 1;
            }
        }

        RecoveryStats {
            total_attempts: total,
            successful,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
            by_kind,
        }
    }
}

fn user_prompt(kind: ErrorKind, message: &str) -> String {
    match kind {
        ErrorKind::InvalidAmount => "Please enter a valid amount".to_string(),
        ErrorKind::InsufficientBalance => {
            "Insufficient balance. Would you like to proceed with a smaller amount?".to_string()
        }
        ErrorKind::CaptchaRequired => "Please solve the CAPTCHA shown on screen".to_string(),
        ErrorKind::OtpRequired => "Please enter the OTP sent to your phone".to_string(),
        ErrorKind::VerificationNeeded => {
            "Additional verification required. Please check the screen.".to_string()
        }
        _ => format!("User intervention needed: {}", message),
    }
}
