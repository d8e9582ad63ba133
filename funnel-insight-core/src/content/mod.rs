//! Content element parsing
//!
//! Converts free-form content blobs (structured JSON or raw text) into the
//! typed `ContentElements` record used for similarity matching. Parsing is
//! pure and deterministic; malformed or unknown fields are omitted, never
//! raised as errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The element kinds tracked at pattern level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Headline,
    Pricing,
    Benefit,
    Feature,
    Cta,
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::Headline => "headline",
            ElementType::Pricing => "pricing",
            ElementType::Benefit => "benefit",
            ElementType::Feature => "feature",
            ElementType::Cta => "cta",
        };
        write!(f, "{}", name)
    }
}

/// Parsed representation of a content blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub benefits: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_to_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub testimonials: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_proof: Option<String>,
}

impl ContentElements {
    pub fn is_empty(&self) -> bool {
        self.headline.is_none()
            && self.pricing.is_none()
            && self.benefits.is_empty()
            && self.features.is_empty()
            && self.call_to_actions.is_empty()
            && self.testimonials.is_empty()
            && self.social_proof.is_none()
    }

    /// Flatten into (type, content) pairs for element-level matching.
    /// Testimonials and social proof stay in the pattern data but are not
    /// tracked as performance elements.
    pub fn typed_elements(&self) -> Vec<(ElementType, &str)> {
        let mut elements = Vec::new();

        if let Some(headline) = &self.headline {
            elements.push((ElementType::Headline, headline.as_str()));
        }
        if let Some(pricing) = &self.pricing {
            elements.push((ElementType::Pricing, pricing.as_str()));
        }
        for benefit in &self.benefits {
            elements.push((ElementType::Benefit, benefit.as_str()));
        }
        for feature in &self.features {
            elements.push((ElementType::Feature, feature.as_str()));
        }
        for cta in &self.call_to_actions {
            elements.push((ElementType::Cta, cta.as_str()));
        }

        elements
    }
}

/// Parse a content blob into `ContentElements`
///
/// Objects are read field-by-field with a few key aliases; plain strings
/// go through the regex heuristics in `regex-utils`. Anything else yields
/// an empty record.
pub fn parse(raw: &Value) -> ContentElements {
    match raw {
        Value::Object(_) => parse_object(raw),
        Value::String(text) => parse_text(text),
        _ => ContentElements::default(),
    }
}

fn parse_object(raw: &Value) -> ContentElements {
    ContentElements {
        headline: string_field(raw, &["headline", "title"]),
        pricing: string_field(raw, &["pricing", "price"]),
        benefits: list_field(raw, &["benefits"]),
        features: list_field(raw, &["features"]),
        call_to_actions: list_field(raw, &["callToActions", "call_to_actions", "ctas"]),
        testimonials: list_field(raw, &["testimonials"]),
        social_proof: string_field(raw, &["socialProof", "social_proof"]),
    }
}

fn parse_text(text: &str) -> ContentElements {
    ContentElements {
        headline: regex_utils::headline::extract(text),
        pricing: regex_utils::pricing::extract(text),
        benefits: regex_utils::bullets::extract(text),
        features: Vec::new(),
        call_to_actions: regex_utils::cta::extract(text),
        testimonials: regex_utils::social::extract_testimonials(text),
        social_proof: regex_utils::social::extract_proof(text),
    }
}

fn string_field(raw: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match raw.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return Some(s.trim().to_string());
            }
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => continue,
        }
    }
    None
}

fn list_field(raw: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match raw.get(key) {
            Some(Value::Array(items)) => {
                let strings: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                        _ => None,
                    })
                    .collect();
                if !strings.is_empty() {
                    return strings;
                }
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return vec![s.trim().to_string()];
            }
            _ => continue,
        }
    }
    Vec::new()
}

/// Lowercase and collapse whitespace, so cosmetic edits hash identically
pub fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable fingerprint of a content field used for similarity grouping
pub fn element_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    normalize(content).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object_with_missing_pricing() {
        let raw = json!({ "headline": "Get results now" });

        let elements = parse(&raw);
        assert_eq!(elements.headline.as_deref(), Some("Get results now"));
        assert!(elements.pricing.is_none());
    }

    #[test]
    fn test_parse_omits_malformed_fields() {
        let raw = json!({
            "headline": 42,
            "pricing": { "amount": 99 },
            "benefits": ["Save time", 7, "Close faster"],
            "callToActions": "Book a call"
        });

        let elements = parse(&raw);
        // Numeric headline is rendered, object pricing is dropped
        assert_eq!(elements.headline.as_deref(), Some("42"));
        assert!(elements.pricing.is_none());
        assert_eq!(elements.benefits, vec!["Save time", "Close faster"]);
        assert_eq!(elements.call_to_actions, vec!["Book a call"]);
    }

    #[test]
    fn test_parse_raw_text() {
        let text = "headline: Double your pipeline\nprice: $499/mo\n- No setup fees\nGet started today";

        let elements = parse(&json!(text));
        assert_eq!(elements.headline.as_deref(), Some("Double your pipeline"));
        assert_eq!(elements.pricing.as_deref(), Some("$499/mo"));
        assert_eq!(elements.benefits, vec!["No setup fees"]);
        assert_eq!(elements.call_to_actions, vec!["Get started today"]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = json!({ "headline": "Urgency language", "benefits": ["a", "b"] });
        assert_eq!(parse(&raw), parse(&raw));
    }

    #[test]
    fn test_parse_non_object_input() {
        assert!(parse(&json!(null)).is_empty());
        assert!(parse(&json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn test_element_hash_normalizes() {
        assert_eq!(element_hash("Urgency  Language"), element_hash("urgency language"));
        assert_ne!(element_hash("urgency language"), element_hash("scarcity language"));
    }

    #[test]
    fn test_typed_elements() {
        let elements = ContentElements {
            headline: Some("H".into()),
            pricing: None,
            benefits: vec!["B1".into(), "B2".into()],
            features: Vec::new(),
            call_to_actions: vec!["C".into()],
            testimonials: vec!["T".into()],
            social_proof: None,
        };

        let typed = elements.typed_elements();
        assert_eq!(typed.len(), 4);
        assert_eq!(typed[0], (ElementType::Headline, "H"));
        assert!(typed.iter().all(|(t, _)| *t != ElementType::Pricing));
    }
}
