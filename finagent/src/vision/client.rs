//! Provider transport with credential rotation and model fallback.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::VisionConfig;
use crate::error::AgentError;
use crate::metrics::SessionMetrics;

/// Transport for one vision/LLM call.
///
/// Implementations must surface the provider's error text verbatim:
/// rate-limit and model-availability handling, and downstream failure
/// classification, all read the message.
#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        image: Option<&str>,
    ) -> Result<String, AgentError>;
}

/// Call counters, updated lock-free from the calling task.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    pub total_calls: AtomicU64,
    pub successful_calls: AtomicU64,
    pub failed_calls: AtomicU64,
    pub key_rotations: AtomicU64,
    pub model_fallbacks: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl ClientMetrics {
    fn record_success(&self, latency: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.successful_calls.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_failure(&self, latency: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_rotation(&self) {
        self.key_rotations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fallback(&self) {
        self.model_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> ClientMetricsSummary {
        let total = self.total_calls.load(Ordering::Relaxed);
        let successful = self.successful_calls.load(Ordering::Relaxed);
        let latency = self.total_latency_ms.load(Ordering::Relaxed);
        ClientMetricsSummary {
            total_calls: total,
            successful_calls: successful,
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            key_rotations: self.key_rotations.load(Ordering::Relaxed),
            model_fallbacks: self.model_fallbacks.load(Ordering::Relaxed),
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
            average_latency_ms: if total > 0 {
                latency as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of [`ClientMetrics`] for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetricsSummary {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub key_rotations: u64,
    pub model_fallbacks: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

/// Vision/LLM client that survives free-tier quotas.
///
/// On a rate-limit error the client backs off exponentially (with jitter,
/// so parallel agents do not stampede) and rotates to the next credential
/// in the pool; each credential is tried at most once per call. On a
/// model-unavailable error it falls back to the next model in the
/// preference list instead of burning a credential. Any other error, and
/// exhaustion of either pool, surfaces the provider's last error
/// unmodified.
pub struct KeyRotatingClient {
    provider: Arc<dyn VisionProvider>,
    provider_name: String,
    api_keys: Vec<String>,
    models: Vec<String>,
    key_index: AtomicUsize,
    model_index: AtomicUsize,
    base_delay: Duration,
    max_delay: Duration,
    metrics: ClientMetrics,
    session: Option<Arc<SessionMetrics>>,
}

impl KeyRotatingClient {
    pub fn new(config: &VisionConfig, provider: Arc<dyn VisionProvider>) -> Self {
        KeyRotatingClient {
            provider,
            provider_name: config.provider.clone(),
            api_keys: config.api_keys.clone(),
            models: config.models.clone(),
            key_index: AtomicUsize::new(0),
            model_index: AtomicUsize::new(0),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            metrics: ClientMetrics::default(),
            session: None,
        }
    }

    /// Also mirror every attempt into the session-wide API log.
    pub fn with_session_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.session = Some(metrics);
        self
    }

    /// Issue one logical call, retrying across the credential pool and
    /// the model preference list as needed.
    pub async fn call(&self, prompt: &str, image: Option<&str>) -> Result<String, AgentError> {
        let key_budget = self.api_keys.len().max(1);
        let mut keys_tried = 0usize;

        loop {
            let key = self.active_key();
            let model = self.active_model();
            let started = Instant::now();

            match self.provider.generate(&key, &model, prompt, image).await {
                Ok(text) => {
                    let latency = started.elapsed();
                    self.metrics.record_success(latency);
                    if let Some(session) = &self.session {
                        session.record_api_call(
                            &self.provider_name,
                            &model,
                            latency.as_millis() as u64,
                            true,
                            None,
                        );
                    }
                    return Ok(text);
                }
                Err(err) => {
                    let latency = started.elapsed();
                    self.metrics.record_failure(latency);
                    if let Some(session) = &self.session {
                        session.record_api_call(
                            &self.provider_name,
                            &model,
                            latency.as_millis() as u64,
                            false,
                            Some(err.to_string()),
                        );
                    }
                    let lower = err.to_string().to_lowercase();

                    if is_rate_limit(&lower) {
                        keys_tried += 1;
                        if keys_tried >= key_budget {
                            log::error!(
                                "{}: credential pool exhausted after {} attempt(s)",
                                self.provider_name,
                                keys_tried
                            );
                            return Err(err);
                        }
                        let delay = self.backoff_delay((keys_tried - 1) as u32);
                        log::warn!(
                            "{}: rate limited, backing off {}ms then rotating credentials",
                            self.provider_name,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        self.rotate_key();
                    } else if is_model_unavailable(&lower) {
                        match self.fallback_model() {
                            Some(next) => {
                                log::warn!("model {} unavailable, retrying with {}", model, next)
                            }
                            None => return Err(err),
                        }
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    pub fn active_key_index(&self) -> usize {
        if self.api_keys.is_empty() {
            return 0;
        }
        self.key_index.load(Ordering::SeqCst) % self.api_keys.len()
    }

    pub fn active_model(&self) -> String {
        if self.models.is_empty() {
            return String::new();
        }
        self.models[self.model_index.load(Ordering::SeqCst).min(self.models.len() - 1)].clone()
    }

    fn active_key(&self) -> String {
        if self.api_keys.is_empty() {
            return String::new();
        }
        self.api_keys[self.active_key_index()].clone()
    }

    fn rotate_key(&self) {
        if self.api_keys.is_empty() {
            return;
        }
        let next = (self.key_index.load(Ordering::SeqCst) + 1) % self.api_keys.len();
        self.key_index.store(next, Ordering::SeqCst);
        self.metrics.record_rotation();
        log::info!(
            "{}: rotated to credential {}/{}",
            self.provider_name,
            next + 1,
            self.api_keys.len()
        );
    }

    /// Advance to the next model in the preference list, if any is left.
    fn fallback_model(&self) -> Option<String> {
        let current = self.model_index.load(Ordering::SeqCst);
        if current + 1 < self.models.len() {
            self.model_index.store(current + 1, Ordering::SeqCst);
            self.metrics.record_fallback();
            Some(self.models[current + 1].clone())
        } else {
            None
        }
    }

    /// Exponential backoff with ±25% jitter, capped at the configured
    /// ceiling before jitter is applied.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let exponential = base.saturating_mul(1u64 << attempt.min(16));
        let capped = exponential.min(self.max_delay.as_millis() as u64);
        let jitter_span = capped / 4;
        let low = capped - jitter_span;
        let high = capped + jitter_span;
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

fn is_rate_limit(message: &str) -> bool {
    message.contains("429")
        || message.contains("quota")
        || message.contains("rate")
        || message.contains("limit")
}

fn is_model_unavailable(message: &str) -> bool {
    message.contains("model")
        && (message.contains("not found")
            || message.contains("unavailable")
            || message.contains("deprecated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, AgentError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, AgentError>>) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl VisionProvider for ScriptedProvider {
        async fn generate(
            &self,
            api_key: &str,
            model: &str,
            _prompt: &str,
            _image: Option<&str>,
        ) -> Result<String, AgentError> {
            self.calls
                .lock()
                .unwrap()
                .push((api_key.to_string(), model.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Provider("script exhausted".to_string())))
        }
    }

    fn config(keys: &[&str]) -> VisionConfig {
        VisionConfig {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..VisionConfig::default()
        }
    }

    #[tokio::test]
    async fn success_needs_no_rotation() {
        let provider = ScriptedProvider::new(vec![Ok("{\"found\": true}".to_string())]);
        let client = KeyRotatingClient::new(&config(&["k1", "k2"]), provider.clone());

        let reply = client.call("find it", None).await.unwrap();
        assert_eq!(reply, "{\"found\": true}");
        assert_eq!(client.active_key_index(), 0);
        assert_eq!(client.metrics().summary().key_rotations, 0);
    }

    #[tokio::test]
    async fn rate_limit_rotates_through_the_pool() {
        let provider = ScriptedProvider::new(vec![
            Err(AgentError::Provider("429 quota exceeded".to_string())),
            Err(AgentError::Provider("rate limit hit".to_string())),
            Ok("ok".to_string()),
        ]);
        let client = KeyRotatingClient::new(&config(&["k1", "k2", "k3"]), provider.clone());

        let reply = client.call("prompt", None).await.unwrap();
        assert_eq!(reply, "ok");

        let keys: Vec<String> = provider.calls().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);

        let summary = client.metrics().summary();
        assert_eq!(summary.key_rotations, 2);
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.failed_calls, 2);
    }

    #[tokio::test]
    async fn exhausted_pool_surfaces_last_error() {
        let provider = ScriptedProvider::new(vec![
            Err(AgentError::Provider("429 first".to_string())),
            Err(AgentError::Provider("429 second".to_string())),
        ]);
        let client = KeyRotatingClient::new(&config(&["k1", "k2"]), provider.clone());

        let err = client.call("prompt", None).await.unwrap_err();
        assert_eq!(err.to_string(), "429 second");
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn model_unavailable_falls_back_without_rotating() {
        let provider = ScriptedProvider::new(vec![
            Err(AgentError::Provider(
                "model gemini-1.5-flash not found".to_string(),
            )),
            Ok("ok".to_string()),
        ]);
        let client = KeyRotatingClient::new(&config(&["k1"]), provider.clone());

        client.call("prompt", None).await.unwrap();

        let models: Vec<String> = provider.calls().into_iter().map(|(_, m)| m).collect();
        assert_eq!(models, vec!["gemini-1.5-flash", "gemini-1.5-pro"]);

        let summary = client.metrics().summary();
        assert_eq!(summary.model_fallbacks, 1);
        assert_eq!(summary.key_rotations, 0);
    }

    #[tokio::test]
    async fn unrelated_errors_surface_immediately() {
        let provider = ScriptedProvider::new(vec![Err(AgentError::Provider(
            "invalid api key".to_string(),
        ))]);
        let client = KeyRotatingClient::new(&config(&["k1", "k2"]), provider.clone());

        let err = client.call("prompt", None).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid api key");
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(client.active_key_index(), 0);
    }

    #[tokio::test]
    async fn attempts_are_mirrored_into_session_metrics() {
        let provider = ScriptedProvider::new(vec![
            Err(AgentError::Provider("429 quota exceeded".to_string())),
            Ok("ok".to_string()),
        ]);
        let session = Arc::new(SessionMetrics::new());
        let client = KeyRotatingClient::new(&config(&["k1", "k2"]), provider)
            .with_session_metrics(session.clone());

        client.call("prompt", None).await.unwrap();

        let summary = session.summary();
        assert_eq!(summary.api.total_calls, 2);
        assert_eq!(summary.api.successful, 1);
        assert_eq!(summary.api.failed, 1);
    }
}
