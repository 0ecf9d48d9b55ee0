//! Screenshot-driven element location, with the cache consulted first.

use std::sync::Arc;

use crate::element_cache::{CachedElement, ElementCache};
use crate::error::AgentError;
use crate::vision::client::KeyRotatingClient;
use crate::vision::types::{ActionVerification, ElementLocation, PageAnalysis};

/// Locates UI elements on portal pages by asking the vision model, going
/// through [`ElementCache`] first so repeated lookups on an unchanged page
/// cost nothing.
pub struct ElementResolver {
    client: Arc<KeyRotatingClient>,
    cache: Arc<ElementCache>,
}

impl ElementResolver {
    pub fn new(client: Arc<KeyRotatingClient>, cache: Arc<ElementCache>) -> Self {
        ElementResolver { client, cache }
    }

    /// Find one element on the page. Cache hits skip the model entirely;
    /// successful model answers are stored for next time.
    pub async fn find_element(
        &self,
        page_url: &str,
        description: &str,
        element_type: &str,
        screenshot: &str,
        page_content: Option<&str>,
    ) -> Result<ElementLocation, AgentError> {
        if let Some(cached) = self
            .cache
            .get(page_url, element_type, description, page_content)
        {
            log::debug!(
                "cache hit for \"{}\" on {} ({}, {})",
                description,
                page_url,
                cached.x,
                cached.y
            );
            return Ok(cached.into());
        }

        let prompt = find_element_prompt(description, element_type);
        let reply = self.client.call(&prompt, Some(screenshot)).await?;
        let location = ElementLocation::from_response(&reply, element_type, description);

        if location.found {
            let mut element = CachedElement::new(
                page_url,
                element_type,
                description,
                location.x,
                location.y,
                location.confidence,
            );
            if let Some(hint) = &location.selector_hint {
                element = element.with_selector_hint(hint.clone());
            }
            self.cache.store(element, page_content);
        }

        Ok(location)
    }

    /// Describe the page as a whole: type, state, interactive elements.
    pub async fn analyze_page(&self, screenshot: &str) -> Result<PageAnalysis, AgentError> {
        let reply = self.client.call(ANALYZE_PAGE_PROMPT, Some(screenshot)).await?;
        Ok(PageAnalysis::from_response(&reply))
    }

    /// Check whether the screen shows the expected outcome of an action.
    /// Model failures do not fail the step; verification is advisory.
    pub async fn verify_action(&self, screenshot: &str, expected_outcome: &str) -> ActionVerification {
        let prompt = verify_action_prompt(expected_outcome);
        match self.client.call(&prompt, Some(screenshot)).await {
            Ok(reply) => ActionVerification::from_response(&reply),
            Err(err) => {
                log::warn!("verification call failed: {}", err);
                ActionVerification::skipped("Verification skipped due to error")
            }
        }
    }

    /// Read the text out of one region of the screenshot, e.g. a balance
    /// figure or an error banner. `None` when the region has no text.
    pub async fn extract_text(
        &self,
        screenshot: &str,
        region_description: &str,
    ) -> Result<Option<String>, AgentError> {
        let prompt = extract_text_prompt(region_description);
        let reply = self.client.call(&prompt, Some(screenshot)).await?;
        let text = reply.trim();
        if text.is_empty() || text == "NOT_FOUND" {
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }

    pub fn cache(&self) -> &ElementCache {
        &self.cache
    }
}

fn find_element_prompt(description: &str, element_type: &str) -> String {
    format!(
        r#"Analyze this banking website screenshot and find the UI element described below.

TASK: Find the "{description}" {element_type}

INSTRUCTIONS:
1. Look carefully at the screenshot
2. Find the element that matches the description
3. Estimate the CENTER coordinates (x, y) of the element
4. The image is approximately 1280x800 pixels

RESPOND IN THIS EXACT JSON FORMAT:
{{
    "found": true or false,
    "element_type": "{element_type}",
    "description": "what you found",
    "x": center_x_coordinate,
    "y": center_y_coordinate,
    "confidence": 0.0 to 1.0,
    "selector_hint": "CSS selector if visible (like #login-btn or .action-card)"
}}

If element is NOT found, set found=false and x,y to 0.
ONLY return the JSON, no other text."#
    )
}

const ANALYZE_PAGE_PROMPT: &str = r#"Analyze this banking website screenshot and describe:

1. PAGE TYPE: What type of page is this? (login, dashboard, payment, transfer, gold_purchase, profile, etc.)

2. CURRENT STATE: What is the current state? (logged_out, logged_in, form_empty, form_filled, modal_open, success_shown, error_shown)

3. KEY ELEMENTS: List all interactive elements visible with their approximate positions:
   - Buttons (with text labels)
   - Input fields (with labels)
   - Links/Navigation items
   - Modals or popups

4. SUGGESTIONS: What actions can be taken on this page?

RESPOND IN THIS EXACT JSON FORMAT:
{
    "page_type": "type_here",
    "current_state": "state_here",
    "elements": [
        {"type": "button", "label": "Login", "x": 640, "y": 400},
        {"type": "input", "label": "Username", "x": 640, "y": 300}
    ],
    "suggestions": ["Click Login button", "Enter username"]
}

ONLY return the JSON, no other text."#;

fn verify_action_prompt(expected_outcome: &str) -> String {
    format!(
        r#"Analyze this screenshot and verify if the expected outcome occurred.

EXPECTED OUTCOME: {expected_outcome}

Look for:
1. Success indicators (green messages, checkmarks, correct page loaded)
2. Error indicators (red messages, error modals, wrong page)
3. Loading states (spinners, processing)

RESPOND IN THIS EXACT JSON FORMAT:
{{
    "success": true or false,
    "description": "what you see on the screen",
    "indicators": ["list", "of", "visual", "clues"]
}}

ONLY return the JSON, no other text."#
    )
}

fn extract_text_prompt(region_description: &str) -> String {
    format!(
        r#"Look at this banking screenshot and extract the text from: {region_description}

Examples:
- "account balance" → "₹ 45,678.50"
- "error message" → "Insufficient balance"
- "success message" → "Transaction successful"

RESPOND with ONLY the extracted text, nothing else.
If text is not found, respond with "NOT_FOUND"."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, VisionConfig};
    use crate::vision::client::VisionProvider;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<u64>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                replies: Mutex::new(replies.into_iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u64 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl VisionProvider for ScriptedProvider {
        async fn generate(
            &self,
            _api_key: &str,
            _model: &str,
            _prompt: &str,
            _image: Option<&str>,
        ) -> Result<String, AgentError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AgentError::Provider("script exhausted".to_string()))
        }
    }

    fn resolver(provider: Arc<ScriptedProvider>) -> ElementResolver {
        let config = VisionConfig {
            api_keys: vec!["k1".to_string()],
            ..VisionConfig::default()
        };
        let client = Arc::new(KeyRotatingClient::new(&config, provider));
        let cache = Arc::new(ElementCache::new(&CacheConfig::default()));
        ElementResolver::new(client, cache)
    }

    #[tokio::test]
    async fn found_element_is_cached_for_the_next_lookup() {
        let provider = ScriptedProvider::new(vec![
            r#"{"found": true, "element_type": "button", "description": "Login", "x": 640, "y": 400, "confidence": 0.95}"#,
        ]);
        let resolver = resolver(provider.clone());

        let first = resolver
            .find_element("/login", "Login button", "button", "img", None)
            .await
            .unwrap();
        assert!(first.found);
        assert_eq!((first.x, first.y), (640, 400));

        // Same request again: the cache answers, the model is not called.
        let second = resolver
            .find_element("/login", "Login button", "button", "img", None)
            .await
            .unwrap();
        assert!(second.found);
        assert_eq!((second.x, second.y), (640, 400));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn not_found_answers_are_not_cached() {
        let provider = ScriptedProvider::new(vec![
            r#"{"found": false, "x": 0, "y": 0}"#,
            r#"{"found": true, "x": 10, "y": 20, "confidence": 0.8}"#,
        ]);
        let resolver = resolver(provider.clone());

        let miss = resolver
            .find_element("/pay", "Pay button", "button", "img", None)
            .await
            .unwrap();
        assert!(!miss.found);

        let hit = resolver
            .find_element("/pay", "Pay button", "button", "img", None)
            .await
            .unwrap();
        assert!(hit.found);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn verify_action_is_fail_open() {
        let provider = ScriptedProvider::new(vec![]);
        let resolver = resolver(provider);

        let verification = resolver.verify_action("img", "Login successful").await;
        assert!(verification.success);
        assert_eq!(verification.description, "Verification skipped due to error");
    }

    #[tokio::test]
    async fn extract_text_maps_not_found_to_none() {
        let provider = ScriptedProvider::new(vec!["NOT_FOUND", "₹ 45,678.50"]);
        let resolver = resolver(provider);

        assert_eq!(resolver.extract_text("img", "balance").await.unwrap(), None);
        assert_eq!(
            resolver.extract_text("img", "balance").await.unwrap(),
            Some("₹ 45,678.50".to_string())
        );
    }
}
