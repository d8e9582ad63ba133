//! Regex utilities for funnel-insight
//! Extracted to a separate crate for compilation optimization

use once_cell::sync::Lazy;
use regex::Regex;

/// Compiled patterns for headline extraction from raw content blobs
pub mod headline {
    use super::*;

    pub static MARKER_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?mi)^\s*(?:headline|title|h1)\s*[:=]\s*(.+)$")
            .expect("Invalid regex pattern")
    });

    pub static MARKDOWN_PATTERN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("Invalid regex pattern"));

    /// Extract a headline from text
    pub fn extract(text: &str) -> Option<String> {
        if let Some(caps) = MARKER_PATTERN.captures(text) {
            return caps.get(1).map(|m| m.as_str().trim().to_string());
        }

        if let Some(caps) = MARKDOWN_PATTERN.captures(text) {
            return caps.get(1).map(|m| m.as_str().trim().to_string());
        }

        None
    }
}

/// Compiled patterns for pricing extraction
pub mod pricing {
    use super::*;

    pub static MARKER_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?mi)^\s*(?:pricing|price|cost)\s*[:=]\s*(.+)$")
            .expect("Invalid regex pattern")
    });

    pub static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"[$€£]\s?\d[\d,]*(?:\.\d{2})?(?:\s*/\s*(?:mo|month|yr|year|seat|user))?")
            .expect("Invalid regex pattern")
    });

    /// Extract a pricing statement from text
    pub fn extract(text: &str) -> Option<String> {
        if let Some(caps) = MARKER_PATTERN.captures(text) {
            return caps.get(1).map(|m| m.as_str().trim().to_string());
        }

        AMOUNT_PATTERN.find(text).map(|m| m.as_str().trim().to_string())
    }
}

/// Compiled patterns for list-like fields (benefits, features)
pub mod bullets {
    use super::*;

    pub static BULLET_PATTERN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*[-*•]\s+(.+)$").expect("Invalid regex pattern"));

    /// Extract all bullet lines from text
    pub fn extract(text: &str) -> Vec<String> {
        BULLET_PATTERN
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
            .collect()
    }
}

/// Compiled patterns for call-to-action detection
pub mod cta {
    use super::*;

    pub static VERB_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?mi)^\s*(?:(?:get|start|book|claim|try|join|buy|sign|schedule|unlock|grab)\b[^.!\n]{2,60})[.!]?\s*$",
        )
        .expect("Invalid regex pattern")
    });

    /// Extract call-to-action lines from text
    pub fn extract(text: &str) -> Vec<String> {
        VERB_PATTERN
            .captures_iter(text)
            .filter_map(|caps| caps.get(0).map(|m| m.as_str().trim().trim_end_matches(['.', '!']).to_string()))
            .collect()
    }
}

/// Compiled patterns for testimonials and social proof
pub mod social {
    use super::*;

    pub static TESTIMONIAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?m)^\s*"(.{10,240}?)"\s*[-–—]\s*(.+)$"#).expect("Invalid regex pattern")
    });

    pub static PROOF_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)(?:trusted by|used by|join(?:ed by)?)\s+[^.\n]{3,80}|\d[\d,]*\+?\s+(?:customers|clients|users|teams|companies|founders)",
        )
        .expect("Invalid regex pattern")
    });

    /// Extract quoted testimonial lines, attribution included
    pub fn extract_testimonials(text: &str) -> Vec<String> {
        TESTIMONIAL_PATTERN
            .captures_iter(text)
            .filter_map(|caps| {
                let quote = caps.get(1)?.as_str().trim();
                let author = caps.get(2)?.as_str().trim();
                Some(format!("\"{}\" - {}", quote, author))
            })
            .collect()
    }

    /// Extract the first social proof statement from text
    pub fn extract_proof(text: &str) -> Option<String> {
        PROOF_PATTERN.find(text).map(|m| m.as_str().trim().to_string())
    }
}
