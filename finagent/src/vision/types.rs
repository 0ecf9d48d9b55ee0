//! Parsed shapes of vision model replies.
//!
//! Models are asked for strict JSON but reply with prose around it often
//! enough that parsing is fallback-driven: direct parse first, then the
//! outermost brace block, then a typed "not found" default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::element_cache::CachedElement;

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

/// Pull a JSON object out of a model reply.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let block = JSON_BLOCK.find(text)?;
    serde_json::from_str(block.as_str()).ok()
}

fn default_unknown() -> String {
    "unknown".to_string()
}

/// A UI element located in a screenshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementLocation {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub element_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_hint: Option<String>,
}

impl ElementLocation {
    pub fn not_found(element_type: &str, description: &str) -> Self {
        ElementLocation {
            found: false,
            element_type: element_type.to_string(),
            description: description.to_string(),
            x: 0,
            y: 0,
            confidence: 0.0,
            selector_hint: None,
        }
    }

    /// Parse a model reply, falling back to "not found" when no usable
    /// JSON comes back.
    pub fn from_response(text: &str, element_type: &str, description: &str) -> Self {
        let parsed = extract_json(text)
            .and_then(|value| serde_json::from_value::<ElementLocation>(value).ok());
        match parsed {
            Some(mut location) => {
                if location.element_type.is_empty() {
                    location.element_type = element_type.to_string();
                }
                if location.description.is_empty() {
                    location.description = description.to_string();
                }
                location
            }
            None => Self::not_found(element_type, description),
        }
    }
}

impl From<CachedElement> for ElementLocation {
    fn from(cached: CachedElement) -> Self {
        ElementLocation {
            found: true,
            element_type: cached.element_type,
            description: cached.description,
            x: cached.x,
            y: cached.y,
            confidence: cached.confidence,
            selector_hint: cached.selector_hint,
        }
    }
}

/// Whole-page description from the vision model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnalysis {
    #[serde(default = "default_unknown")]
    pub page_type: String,
    #[serde(default)]
    pub elements: Vec<Value>,
    #[serde(default = "default_unknown")]
    pub current_state: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl PageAnalysis {
    /// Fallback when the model reply held no usable JSON.
    pub fn failed() -> Self {
        PageAnalysis {
            page_type: "unknown".to_string(),
            elements: Vec::new(),
            current_state: "Analysis failed".to_string(),
            suggestions: Vec::new(),
        }
    }

    pub fn from_response(text: &str) -> Self {
        extract_json(text)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_else(Self::failed)
    }
}

/// Outcome of a visual verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionVerification {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "default_unknown")]
    pub description: String,
    #[serde(default)]
    pub indicators: Vec<String>,
}

impl ActionVerification {
    /// Fail-open verdict used when verification could not run.
    pub fn skipped(reason: &str) -> Self {
        ActionVerification {
            success: true,
            description: reason.to_string(),
            indicators: Vec::new(),
        }
    }

    pub fn from_response(text: &str) -> Self {
        extract_json(text)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_else(|| Self::skipped("Verification skipped due to error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let reply = r##"{"found": true, "element_type": "button", "description": "Pay Now", "x": 640, "y": 412, "confidence": 0.93, "selector_hint": "#pay-btn"}"##;
        let location = ElementLocation::from_response(reply, "button", "Pay Now button");
        assert!(location.found);
        assert_eq!(location.x, 640);
        assert_eq!(location.selector_hint.as_deref(), Some("#pay-btn"));
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let reply = "Here is what I found:\n```json\n{\"found\": true, \"x\": 100, \"y\": 200}\n```\nHope that helps!";
        let location = ElementLocation::from_response(reply, "input", "Amount field");
        assert!(location.found);
        assert_eq!(location.x, 100);
        // Missing fields fall back to the request's values
        assert_eq!(location.element_type, "input");
        assert_eq!(location.description, "Amount field");
    }

    #[test]
    fn garbage_reply_is_not_found() {
        let location = ElementLocation::from_response("I cannot help with that", "button", "Login");
        assert!(!location.found);
        assert_eq!(location.x, 0);
        assert_eq!(location.confidence, 0.0);
    }

    #[test]
    fn page_analysis_falls_back_on_parse_failure() {
        let analysis = PageAnalysis::from_response("no json here");
        assert_eq!(analysis.page_type, "unknown");
        assert_eq!(analysis.current_state, "Analysis failed");

        let analysis = PageAnalysis::from_response(
            r#"{"page_type": "payment", "current_state": "form_empty", "elements": [{"type": "button", "label": "Pay"}], "suggestions": ["Fill the form"]}"#,
        );
        assert_eq!(analysis.page_type, "payment");
        assert_eq!(analysis.elements.len(), 1);
    }

    #[test]
    fn verification_fails_open() {
        let verification = ActionVerification::from_response("model refused");
        assert!(verification.success);
        assert_eq!(verification.description, "Verification skipped due to error");

        let verification = ActionVerification::from_response(
            r#"{"success": false, "description": "error banner shown", "indicators": ["red banner"]}"#,
        );
        assert!(!verification.success);
        assert_eq!(verification.indicators.len(), 1);
    }
}
