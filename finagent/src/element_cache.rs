//! Screen element cache.
//!
//! Vision lookups are the most expensive calls the agent makes, so
//! resolved element positions are cached per page. Entries expire after a
//! short TTL and are invalidated eagerly when a fingerprint of the page
//! content no longer matches the one recorded at store time.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;

/// A resolved element position, as remembered by the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedElement {
    pub page_url: String,
    pub element_type: String,
    pub description: String,
    pub x: i32,
    pub y: i32,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_hint: Option<String>,
    pub cached_at: DateTime<Utc>,
    /// Fingerprint of the page content at store time.
    pub page_hash: String,
}

impl CachedElement {
    pub fn new(
        page_url: impl Into<String>,
        element_type: impl Into<String>,
        description: impl Into<String>,
        x: i32,
        y: i32,
        confidence: f64,
    ) -> Self {
        CachedElement {
            page_url: page_url.into(),
            element_type: element_type.into(),
            description: description.into(),
            x,
            y,
            confidence,
            selector_hint: None,
            cached_at: Utc::now(),
            page_hash: "unknown".to_string(),
        }
    }

    pub fn with_selector_hint(mut self, hint: impl Into<String>) -> Self {
        self.selector_hint = Some(hint.into());
        self
    }
}

/// Listing row returned by [`ElementCache::cached_elements`].
#[derive(Debug, Clone, Serialize)]
pub struct CachedElementView {
    pub page_url: String,
    pub element_type: String,
    pub description: String,
    pub x: i32,
    pub y: i32,
    pub confidence: f64,
    pub selector_hint: Option<String>,
    pub age_seconds: f64,
    pub expires_in: f64,
}

/// Cache counters, serializable for status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Percentage of lookups served from cache, rounded to 2 decimals.
    pub hit_rate: f64,
    /// Every hit is one vision call that did not happen.
    pub api_calls_saved: u64,
}

struct CacheInner {
    entries: HashMap<String, CachedElement>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// TTL + fingerprint cache for resolved screen elements.
pub struct ElementCache {
    inner: Mutex<CacheInner>,
    ttl_seconds: u64,
    max_entries: usize,
}

impl ElementCache {
    pub fn new(config: &CacheConfig) -> Self {
        ElementCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            ttl_seconds: config.ttl_secs,
            max_entries: config.max_entries,
        }
    }

    /// Look up a cached element.
    ///
    /// Returns `None` on a miss, on an expired entry, or when
    /// `page_content` is given and its fingerprint no longer matches the
    /// stored one. Expired and stale entries are removed on the way out.
    pub fn get(
        &self,
        page_url: &str,
        element_type: &str,
        description: &str,
        page_content: Option<&str>,
    ) -> Option<CachedElement> {
        let key = cache_key(page_url, element_type, description);
        let mut inner = self.inner.lock().unwrap();

        let element = match inner.entries.get(&key) {
            Some(element) => element.clone(),
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if Utc::now() - element.cached_at > Duration::seconds(self.ttl_seconds as i64) {
            log::debug!("cache entry expired: {}", key);
            inner.entries.remove(&key);
            inner.misses += 1;
            return None;
        }

        if let Some(content) = page_content {
            if element.page_hash != hash_page_content(content) {
                log::debug!("page content changed, dropping entry: {}", key);
                inner.entries.remove(&key);
                inner.misses += 1;
                return None;
            }
        }

        inner.hits += 1;
        Some(element)
    }

    /// Store a resolved element, evicting the oldest tenth of the cache
    /// first when the entry cap is reached.
    pub fn store(&self, mut element: CachedElement, page_content: Option<&str>) {
        element.cached_at = Utc::now();
        element.page_hash = match page_content {
            Some(content) => hash_page_content(content),
            None => "unknown".to_string(),
        };
        let key = cache_key(&element.page_url, &element.element_type, &element.description);

        let mut inner = self.inner.lock().unwrap();
        if inner.entries.len() >= self.max_entries {
            evict_oldest(&mut inner);
        }
        inner.entries.insert(key, element);
    }

    /// Drop every entry belonging to one page.
    pub fn invalidate_page(&self, page_url: &str) {
        let prefix = format!("{}:", page_url);
        let mut inner = self.inner.lock().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - inner.entries.len();
        if removed > 0 {
            log::info!("invalidated {} cached element(s) for {}", removed, page_url);
        }
    }

    /// Drop everything. Counters are kept.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.entries.len();
        inner.entries.clear();
        log::info!("invalidated all {} cached element(s)", removed);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let total = inner.hits + inner.misses;
        let hit_rate = if total > 0 {
            (inner.hits as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            ttl_seconds: self.ttl_seconds,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
            api_calls_saved: inner.hits,
        }
    }

    /// List live entries, optionally restricted to one page.
    pub fn cached_elements(&self, page_url: Option<&str>) -> Vec<CachedElementView> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        inner
            .entries
            .values()
            .filter(|e| page_url.map_or(true, |url| e.page_url == url))
            .map(|e| {
                let age = (now - e.cached_at).num_milliseconds() as f64 / 1000.0;
                CachedElementView {
                    page_url: e.page_url.clone(),
                    element_type: e.element_type.clone(),
                    description: e.description.clone(),
                    x: e.x,
                    y: e.y,
                    confidence: e.confidence,
                    selector_hint: e.selector_hint.clone(),
                    age_seconds: (age * 10.0).round() / 10.0,
                    expires_in: ((self.ttl_seconds as f64 - age) * 10.0).round() / 10.0,
                }
            })
            .collect()
    }
}

/// Cache key: page, element type, and normalized description.
fn cache_key(page_url: &str, element_type: &str, description: &str) -> String {
    format!(
        "{}:{}:{}",
        page_url,
        element_type,
        description.to_lowercase().trim()
    )
}

/// Short content fingerprint: first 8 hex chars of SHA-256.
fn hash_page_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..8].to_string()
}

fn evict_oldest(inner: &mut CacheInner) {
    let count = (inner.entries.len() / 10).max(1);
    let mut by_age: Vec<(String, DateTime<Utc>)> = inner
        .entries
        .iter()
        .map(|(key, e)| (key.clone(), e.cached_at))
        .collect();
    by_age.sort_by_key(|(_, cached_at)| *cached_at);
    for (key, _) in by_age.into_iter().take(count) {
        inner.entries.remove(&key);
        inner.evictions += 1;
    }
    log::debug!("evicted {} oldest cache entr(ies)", count);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(ttl_secs: u64, max_entries: usize) -> ElementCache {
        ElementCache::new(&CacheConfig {
            ttl_secs,
            max_entries,
        })
    }

    #[test]
    fn stores_and_returns_elements() {
        let cache = small_cache(30, 500);
        cache.store(
            CachedElement::new("/pay-bills", "button", "Pay Now", 640, 480, 0.95),
            None,
        );

        let hit = cache
            .get("/pay-bills", "button", "Pay Now", None)
            .expect("should hit");
        assert_eq!(hit.x, 640);
        assert_eq!(hit.y, 480);

        // Description matching is case- and whitespace-insensitive
        assert!(cache.get("/pay-bills", "button", "  PAY NOW ", None).is_some());
        assert!(cache.get("/pay-bills", "button", "Pay Later", None).is_none());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = small_cache(0, 500);
        cache.store(
            CachedElement::new("/home", "link", "Transactions", 10, 20, 0.9),
            None,
        );
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(cache.get("/home", "link", "Transactions", None).is_none());
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn changed_page_content_invalidates() {
        let cache = small_cache(30, 500);
        cache.store(
            CachedElement::new("/transfer", "input", "Amount", 5, 5, 0.8),
            Some("<form>v1</form>"),
        );
        assert!(cache
            .get("/transfer", "input", "Amount", Some("<form>v1</form>"))
            .is_some());
        assert!(cache
            .get("/transfer", "input", "Amount", Some("<form>v2</form>"))
            .is_none());
        // Stale entry was dropped, so even the old content misses now
        assert!(cache
            .get("/transfer", "input", "Amount", Some("<form>v1</form>"))
            .is_none());
    }

    #[test]
    fn evicts_oldest_tenth_at_capacity() {
        let cache = small_cache(30, 10);
        cache.store(
            CachedElement::new("/p", "button", "oldest", 0, 0, 0.9),
            None,
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
        for i in 1..10 {
            cache.store(
                CachedElement::new("/p", "button", format!("el-{}", i), i, i, 0.9),
                None,
            );
        }
        assert_eq!(cache.stats().entries, 10);

        cache.store(
            CachedElement::new("/p", "button", "newest", 99, 99, 0.9),
            None,
        );

        let stats = cache.stats();
        assert_eq!(stats.entries, 10);
        assert_eq!(stats.evictions, 1);
        assert!(cache.get("/p", "button", "oldest", None).is_none());
        assert!(cache.get("/p", "button", "newest", None).is_some());
    }

    #[test]
    fn invalidate_page_only_touches_that_page() {
        let cache = small_cache(30, 500);
        cache.store(CachedElement::new("/a", "button", "one", 1, 1, 0.9), None);
        cache.store(CachedElement::new("/b", "button", "two", 2, 2, 0.9), None);

        cache.invalidate_page("/a");
        assert!(cache.get("/a", "button", "one", None).is_none());
        assert!(cache.get("/b", "button", "two", None).is_some());
    }

    #[test]
    fn stats_track_hit_rate() {
        let cache = small_cache(30, 500);
        cache.store(CachedElement::new("/p", "button", "x", 1, 1, 0.9), None);
        cache.get("/p", "button", "x", None);
        cache.get("/p", "button", "x", None);
        cache.get("/p", "button", "missing", None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 66.67);
        assert_eq!(stats.api_calls_saved, 2);
    }

    #[test]
    fn listing_filters_by_page() {
        let cache = small_cache(30, 500);
        cache.store(CachedElement::new("/a", "button", "one", 1, 1, 0.9), None);
        cache.store(CachedElement::new("/b", "button", "two", 2, 2, 0.9), None);

        assert_eq!(cache.cached_elements(None).len(), 2);
        let only_a = cache.cached_elements(Some("/a"));
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].description, "one");
        assert!(only_a[0].expires_in > 0.0);
    }
}
