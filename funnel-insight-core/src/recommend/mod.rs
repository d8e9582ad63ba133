//! Recommendation generation
//!
//! Derives ranked, actionable suggestions from active success patterns.
//! Regenerating for a pattern replaces its previous recommendations rather
//! than accumulating duplicates; use/success counters are mutated by the
//! dashboard collaborator when a suggestion is applied.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::store::{PatternType, SuccessPattern};
use crate::{EngineError, Result};

/// Baseline success rate improvements are measured against
const BASELINE_RATE: f64 = 0.5;
/// Element performance required before it earns a content-change item
const ELEMENT_RATE_FLOOR: f64 = 0.6;
const ELEMENT_USE_FLOOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Content,
    Hypothesis,
    AbTest,
    Timing,
}

/// Critical > High > Medium > Low; derives Ord with Critical smallest so
/// ascending sort puts the most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Priority::Critical
        } else if confidence >= 0.8 {
            Priority::High
        } else if confidence > 0.7 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub description: String,
    pub suggested_value: String,
    pub priority: Priority,
}

/// Actionable suggestion derived from one source pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub source_pattern_id: Uuid,
    pub recommendation_type: RecommendationType,
    pub confidence_score: f64,
    pub expected_improvement: f64,
    pub action_items: Vec<ActionItem>,
    pub use_count: usize,
    pub success_count: usize,
    pub is_active: bool,
    pub generated_at: DateTime<Utc>,
}

impl Recommendation {
    /// Ranking priority: the most urgent action item
    pub fn priority(&self) -> Priority {
        self.action_items.iter().map(|item| item.priority).min().unwrap_or(Priority::Low)
    }
}

/// Read filter for the recommendation query surface
#[derive(Debug, Clone, Default)]
pub struct RecommendationFilter {
    pub recommendation_type: Option<RecommendationType>,
    pub min_confidence: Option<f64>,
}

/// Generates and owns recommendations; patterns are referenced by id only
#[derive(Debug, Default)]
pub struct RecommendationGenerator {
    recommendations: DashMap<Uuid, Recommendation>,
}

impl RecommendationGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive recommendations for a pattern without storing them
    pub fn generate(&self, pattern: &SuccessPattern) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        let confidence = pattern.confidence_score;

        match pattern.pattern_type {
            PatternType::Hypothesis | PatternType::Mixed => {
                if let Some(hypothesis) = &pattern.pattern_data.representative_hypothesis {
                    recommendations.push(self.new_recommendation(
                        pattern,
                        RecommendationType::Hypothesis,
                        vec![ActionItem {
                            description: format!(
                                "Run a hypothesis test confirming \"{}\" on upcoming journeys",
                                hypothesis
                            ),
                            suggested_value: hypothesis.clone(),
                            priority: Priority::from_confidence(confidence),
                        }],
                    ));
                }
            }
            PatternType::ContentElement => {
                let items: Vec<ActionItem> = pattern
                    .elements
                    .iter()
                    .filter(|e| {
                        e.success_rate() >= ELEMENT_RATE_FLOOR && e.total_count >= ELEMENT_USE_FLOOR
                    })
                    .map(|element| ActionItem {
                        description: format!(
                            "Adopt the high-performing {} across active funnels",
                            element.element_type
                        ),
                        suggested_value: element.element_content.clone(),
                        priority: if element.success_rate() >= 0.8 {
                            Priority::High
                        } else {
                            Priority::Medium
                        },
                    })
                    .collect();

                if !items.is_empty() {
                    recommendations.push(self.new_recommendation(
                        pattern,
                        RecommendationType::Content,
                        items,
                    ));
                }

                // A promoted but not yet convincing pattern earns an A/B
                // validation run instead of a blanket rollout.
                if confidence <= 0.8 {
                    recommendations.push(self.new_recommendation(
                        pattern,
                        RecommendationType::AbTest,
                        vec![ActionItem {
                            description: "Validate the winning variant with a split test before rolling it out".to_string(),
                            suggested_value: pattern.pattern_key.clone(),
                            priority: Priority::Medium,
                        }],
                    ));
                }
            }
            PatternType::Timing => {
                let window = pattern
                    .pattern_data
                    .timing_bucket
                    .map(|bucket| bucket.describe())
                    .unwrap_or("the observed engagement window");

                recommendations.push(self.new_recommendation(
                    pattern,
                    RecommendationType::Timing,
                    vec![ActionItem {
                        description: format!("Schedule follow-ups to target {}", window),
                        suggested_value: pattern
                            .pattern_data
                            .timing_bucket
                            .map(|b| b.label().to_string())
                            .unwrap_or_default(),
                        priority: Priority::from_confidence(confidence),
                    }],
                ));
            }
        }

        recommendations
    }

    /// Replace the stored recommendations for a pattern with freshly
    /// derived ones
    pub fn regenerate(&self, pattern: &SuccessPattern) -> Vec<Recommendation> {
        self.remove_for_pattern(&pattern.id);

        let generated = self.generate(pattern);
        for recommendation in &generated {
            self.recommendations.insert(recommendation.id, recommendation.clone());
        }

        debug!(pattern = %pattern.id, count = generated.len(), "regenerated recommendations");
        generated
    }

    /// Drop recommendations tied to a deactivated pattern
    pub fn deactivate_for_pattern(&self, pattern_id: &Uuid) {
        for mut entry in self.recommendations.iter_mut() {
            if entry.value().source_pattern_id == *pattern_id {
                entry.value_mut().is_active = false;
            }
        }
    }

    /// Active recommendations, ranked by (priority, confidence desc)
    pub fn list(&self, filter: &RecommendationFilter) -> Vec<Recommendation> {
        let mut results: Vec<Recommendation> = self
            .recommendations
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|r| r.is_active)
            .filter(|r| {
                filter.recommendation_type.map_or(true, |t| r.recommendation_type == t)
                    && filter.min_confidence.map_or(true, |min| r.confidence_score >= min)
            })
            .collect();

        results.sort_by(|a, b| {
            a.priority().cmp(&b.priority()).then_with(|| {
                b.confidence_score
                    .partial_cmp(&a.confidence_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        results
    }

    pub fn get(&self, id: &Uuid) -> Option<Recommendation> {
        self.recommendations.get(id).map(|entry| entry.value().clone())
    }

    /// Count an application of the recommendation
    pub fn record_usage(&self, id: &Uuid) -> Result<()> {
        let mut entry = self
            .recommendations
            .get_mut(id)
            .ok_or_else(|| EngineError::Store(format!("recommendation {} not found", id)))?;
        entry.value_mut().use_count += 1;
        Ok(())
    }

    /// Count the known outcome of an applied recommendation
    pub fn record_outcome(&self, id: &Uuid, success: bool) -> Result<()> {
        let mut entry = self
            .recommendations
            .get_mut(id)
            .ok_or_else(|| EngineError::Store(format!("recommendation {} not found", id)))?;
        if success {
            entry.value_mut().success_count += 1;
        }
        Ok(())
    }

    fn new_recommendation(
        &self,
        pattern: &SuccessPattern,
        recommendation_type: RecommendationType,
        action_items: Vec<ActionItem>,
    ) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            source_pattern_id: pattern.id,
            recommendation_type,
            confidence_score: pattern.confidence_score,
            expected_improvement: pattern.success_rate - BASELINE_RATE,
            action_items,
            use_count: 0,
            success_count: 0,
            is_active: true,
            generated_at: Utc::now(),
        }
    }

    fn remove_for_pattern(&self, pattern_id: &Uuid) {
        self.recommendations.retain(|_, r| r.source_pattern_id != *pattern_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::TimingBucket;
    use crate::content::ElementType;
    use crate::store::{PatternData, PatternElement};

    fn hypothesis_pattern(confidence: f64) -> SuccessPattern {
        SuccessPattern {
            id: Uuid::new_v4(),
            pattern_key: "hypothesis:urgency language".to_string(),
            pattern_type: PatternType::Hypothesis,
            pattern_data: PatternData {
                representative_hypothesis: Some("urgency language".to_string()),
                ..Default::default()
            },
            confidence_score: confidence,
            sample_size: 6,
            success_rate: 0.85,
            statistical_significance: 0.04,
            identified_at: Utc::now(),
            last_validated: Utc::now(),
            is_active: true,
            elements: Vec::new(),
        }
    }

    fn element_pattern() -> SuccessPattern {
        let mut pattern = hypothesis_pattern(0.78);
        pattern.pattern_type = PatternType::ContentElement;
        pattern.elements = vec![
            PatternElement {
                element_type: ElementType::Headline,
                element_content: "Get results now".to_string(),
                element_hash: 1,
                success_count: 4,
                total_count: 5,
            },
            PatternElement {
                element_type: ElementType::Cta,
                element_content: "Book a call".to_string(),
                element_hash: 2,
                success_count: 1,
                total_count: 4,
            },
        ];
        pattern
    }

    #[test]
    fn test_hypothesis_pattern_yields_hypothesis_test() {
        let generator = RecommendationGenerator::new();
        let recommendations = generator.generate(&hypothesis_pattern(0.92));

        assert_eq!(recommendations.len(), 1);
        let rec = &recommendations[0];
        assert_eq!(rec.recommendation_type, RecommendationType::Hypothesis);
        assert_eq!(rec.action_items.len(), 1);
        assert_eq!(rec.action_items[0].priority, Priority::Critical);
        assert!((rec.expected_improvement - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_element_pattern_filters_weak_elements() {
        let generator = RecommendationGenerator::new();
        let recommendations = generator.generate(&element_pattern());

        let content = recommendations
            .iter()
            .find(|r| r.recommendation_type == RecommendationType::Content)
            .unwrap();
        // The 25%-rate CTA does not earn an item.
        assert_eq!(content.action_items.len(), 1);
        assert_eq!(content.action_items[0].suggested_value, "Get results now");
        assert_eq!(content.action_items[0].priority, Priority::High);

        // Confidence 0.78 also earns a split-test validation run.
        assert!(recommendations
            .iter()
            .any(|r| r.recommendation_type == RecommendationType::AbTest));
    }

    #[test]
    fn test_timing_pattern_describes_window() {
        let generator = RecommendationGenerator::new();
        let mut pattern = hypothesis_pattern(0.82);
        pattern.pattern_type = PatternType::Timing;
        pattern.pattern_data =
            PatternData { timing_bucket: Some(TimingBucket::UnderOneHour), ..Default::default() };

        let recommendations = generator.generate(&pattern);
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].recommendation_type, RecommendationType::Timing);
        assert!(recommendations[0].action_items[0].description.contains("first hour"));
    }

    #[test]
    fn test_regenerate_replaces_previous() {
        let generator = RecommendationGenerator::new();
        let pattern = hypothesis_pattern(0.85);

        generator.regenerate(&pattern);
        generator.regenerate(&pattern);

        let listed = generator.list(&RecommendationFilter::default());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_pattern_id, pattern.id);
    }

    #[test]
    fn test_ranking_priority_then_confidence() {
        let generator = RecommendationGenerator::new();

        let critical = hypothesis_pattern(0.95);
        let high_a = hypothesis_pattern(0.82);
        let high_b = hypothesis_pattern(0.88);

        generator.regenerate(&critical);
        generator.regenerate(&high_a);
        generator.regenerate(&high_b);

        let listed = generator.list(&RecommendationFilter::default());
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].priority(), Priority::Critical);
        assert_eq!(listed[1].confidence_score, 0.88);
        assert_eq!(listed[2].confidence_score, 0.82);
    }

    #[test]
    fn test_deactivate_for_pattern() {
        let generator = RecommendationGenerator::new();
        let pattern = hypothesis_pattern(0.85);
        let generated = generator.regenerate(&pattern);

        generator.deactivate_for_pattern(&pattern.id);

        assert!(generator.list(&RecommendationFilter::default()).is_empty());
        // Still retrievable by id for auditability.
        assert!(!generator.get(&generated[0].id).unwrap().is_active);
    }

    #[test]
    fn test_usage_counters() {
        let generator = RecommendationGenerator::new();
        let generated = generator.regenerate(&hypothesis_pattern(0.85));
        let id = generated[0].id;

        generator.record_usage(&id).unwrap();
        generator.record_usage(&id).unwrap();
        generator.record_outcome(&id, true).unwrap();
        generator.record_outcome(&id, false).unwrap();

        let rec = generator.get(&id).unwrap();
        assert_eq!(rec.use_count, 2);
        assert_eq!(rec.success_count, 1);

        assert!(generator.record_usage(&Uuid::new_v4()).is_err());
    }
}
