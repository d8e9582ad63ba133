//! Statistical scoring of candidate patterns
//!
//! Computes the composite confidence score, the consistency component, and
//! the one-proportion significance test with the documented edge-case
//! caps. Scoring never suspends and never produces NaN; edge cases resolve
//! to the defaults below instead of propagating to callers.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::cluster::CandidatePattern;

/// Confidence weight given to raw sample size (saturates at 10 successes)
const SAMPLE_WEIGHT: f64 = 0.4;
/// Confidence weight given to the observed success rate
const RATE_WEIGHT: f64 = 0.4;
/// Confidence weight given to timing consistency
const CONSISTENCY_WEIGHT: f64 = 0.2;

/// Score produced for one candidate pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternScore {
    pub confidence_score: f64,
    pub statistical_significance: f64,
    pub success_rate: f64,
    pub consistency: f64,
    pub sample_size: usize,
}

/// Statistical analysis module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalAnalyzer {
    /// No-effect baseline the success rate is tested against
    pub baseline_rate: f64,
    /// Confidence a candidate must strictly exceed to become a pattern
    pub activation_threshold: f64,
}

impl Default for StatisticalAnalyzer {
    fn default() -> Self {
        Self { baseline_rate: 0.5, activation_threshold: 0.7 }
    }
}

impl StatisticalAnalyzer {
    pub fn new(baseline_rate: f64, activation_threshold: f64) -> Self {
        Self { baseline_rate, activation_threshold }
    }

    /// Score a candidate group
    pub fn score(&self, candidate: &CandidatePattern) -> PatternScore {
        let success_count = candidate.success_count();
        let sample_size = candidate.total_attempts();
        let success_rate = candidate.success_rate();

        let durations: Vec<f64> = candidate
            .members
            .iter()
            .filter_map(|m| m.timing_factors.primary_duration())
            .filter(|d| d.is_finite())
            .collect();
        let consistency = consistency_score(&durations);

        PatternScore {
            confidence_score: confidence(success_count, sample_size, consistency),
            statistical_significance: self.significance(success_rate, sample_size),
            success_rate,
            consistency,
            sample_size,
        }
    }

    /// Whether a score clears the activation threshold (strictly greater).
    /// The small tolerance keeps a composite that lands exactly on the
    /// threshold from promoting on floating-point dust.
    pub fn promotes(&self, score: &PatternScore) -> bool {
        score.confidence_score - self.activation_threshold > 1e-9
    }

    /// One-proportion z-test against the baseline, with the small-sample
    /// caps applied before the test result is trusted
    fn significance(&self, success_rate: f64, sample_size: usize) -> f64 {
        if sample_size < 3 {
            return 1.0;
        }

        let computed = two_sided_p_value(success_rate, sample_size, self.baseline_rate);

        // Perfect rate on a small sample: report no better than 0.1.
        if success_rate >= 1.0 && sample_size < 10 {
            return computed.min(0.1).max(f64::MIN_POSITIVE);
        }

        computed.clamp(f64::MIN_POSITIVE, 1.0)
    }
}

/// Composite confidence: sample-size weight, success rate, consistency
pub fn confidence(success_count: usize, total_attempts: usize, consistency: f64) -> f64 {
    if total_attempts == 0 {
        return 0.0;
    }

    let sample_component = (success_count as f64 / 10.0).min(1.0);
    let rate_component = success_count as f64 / total_attempts as f64;

    SAMPLE_WEIGHT * sample_component
        + RATE_WEIGHT * rate_component
        + CONSISTENCY_WEIGHT * consistency.clamp(0.0, 1.0)
}

/// Consistency from duration spread: 1 / (1 + cv), where cv is the
/// coefficient of variation. Fewer than two usable durations, or a zero
/// mean, yield 1.0 (no evidence of inconsistency).
pub fn consistency_score(durations: &[f64]) -> f64 {
    if durations.len() < 2 {
        return 1.0;
    }

    let n = durations.len() as f64;
    let mean = durations.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 1.0;
    }

    let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;

    1.0 / (1.0 + cv)
}

fn two_sided_p_value(success_rate: f64, sample_size: usize, baseline: f64) -> f64 {
    let n = sample_size as f64;
    let standard_error = (baseline * (1.0 - baseline) / n).sqrt();
    if standard_error == 0.0 {
        return 1.0;
    }

    let z = (success_rate - baseline) / standard_error;
    let normal = Normal::new(0.0, 1.0).expect("unit normal is always valid");

    (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterEngine, PatternKey};
    use crate::content::ContentElements;
    use crate::outcome::{Outcome, OutcomeRecord, TimingFactors};
    use chrono::Utc;
    use proptest::prelude::*;

    fn candidate(successes: usize, failures: usize, durations: &[f64]) -> CandidatePattern {
        let mut members = Vec::new();
        for i in 0..successes {
            members.push(OutcomeRecord {
                journey_id: format!("s{}", i),
                hypothesis: "urgency language".to_string(),
                content_elements: ContentElements::default(),
                timing_factors: TimingFactors {
                    journey_duration_secs: durations.get(i).copied(),
                    ..Default::default()
                },
                outcome: Outcome::Success,
                recorded_at: Utc::now(),
            });
        }
        let failures = (0..failures)
            .map(|i| OutcomeRecord {
                journey_id: format!("f{}", i),
                hypothesis: "urgency language".to_string(),
                content_elements: ContentElements::default(),
                timing_factors: TimingFactors::default(),
                outcome: Outcome::Failure,
                recorded_at: Utc::now(),
            })
            .collect();

        CandidatePattern {
            key: PatternKey::Hypothesis { normalized: "urgency language".to_string() },
            members,
            failures,
            created_seq: 0,
        }
    }

    #[test]
    fn test_small_sample_is_never_significant() {
        let analyzer = StatisticalAnalyzer::default();
        for n in 0..3 {
            let score = analyzer.score(&candidate(n, 0, &[]));
            assert_eq!(score.statistical_significance, 1.0, "sample size {}", n);
        }
    }

    #[test]
    fn test_perfect_small_sample_is_capped() {
        let analyzer = StatisticalAnalyzer::default();
        for n in 3..10 {
            let score = analyzer.score(&candidate(n, 0, &[]));
            assert!(score.statistical_significance <= 0.1, "sample size {}", n);
            assert!(score.statistical_significance > 0.0);
        }
    }

    #[test]
    fn test_larger_perfect_sample_uses_the_test() {
        let analyzer = StatisticalAnalyzer::default();
        let score = analyzer.score(&candidate(12, 0, &[]));
        // z = 0.5 / sqrt(0.25/12) ~ 3.46, p ~ 0.0005
        assert!(score.statistical_significance < 0.01);
    }

    #[test]
    fn test_baseline_rate_is_not_significant() {
        let analyzer = StatisticalAnalyzer::default();
        let score = analyzer.score(&candidate(10, 10, &[]));
        assert!(score.statistical_significance > 0.9);
    }

    #[test]
    fn test_confidence_boundary_case() {
        // successRate 1.0, sampleWeight 0.3 (3 successes), consistency 0.9:
        // 0.4*0.3 + 0.4*1.0 + 0.2*0.9 = 0.70 exactly, which must not promote.
        let analyzer = StatisticalAnalyzer::default();
        let score = PatternScore {
            confidence_score: confidence(3, 3, 0.9),
            statistical_significance: 0.1,
            success_rate: 1.0,
            consistency: 0.9,
            sample_size: 3,
        };

        assert!((score.confidence_score - 0.70).abs() < 1e-12);
        assert!(!analyzer.promotes(&score));

        // Anything strictly above the threshold promotes.
        let above = PatternScore { confidence_score: confidence(4, 4, 0.9), ..score };
        assert!(above.confidence_score > 0.70);
        assert!(analyzer.promotes(&above));
    }

    #[test]
    fn test_consistency_prefers_low_variance() {
        let uniform = consistency_score(&[100.0, 100.0, 100.0]);
        let spread = consistency_score(&[10.0, 100.0, 1000.0]);

        assert_eq!(uniform, 1.0);
        assert!(spread < uniform);
        assert!(spread > 0.0);

        assert_eq!(consistency_score(&[]), 1.0);
        assert_eq!(consistency_score(&[42.0]), 1.0);
        assert_eq!(consistency_score(&[0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_score_integrates_with_clustering() {
        let engine = ClusterEngine::default();
        let analyzer = StatisticalAnalyzer::default();

        let history: Vec<OutcomeRecord> = (0..5)
            .map(|i| OutcomeRecord {
                journey_id: format!("j{}", i),
                hypothesis: "urgency language".to_string(),
                content_elements: ContentElements::default(),
                timing_factors: TimingFactors {
                    journey_duration_secs: Some(600.0),
                    ..Default::default()
                },
                outcome: Outcome::Success,
                recorded_at: Utc::now(),
            })
            .collect();

        let candidates = engine.find_candidate_patterns(&history).unwrap();
        let hypothesis = candidates
            .iter()
            .find(|c| matches!(c.key, PatternKey::Hypothesis { .. }))
            .unwrap();
        let score = analyzer.score(hypothesis);

        // 0.4*0.5 + 0.4*1.0 + 0.2*1.0 = 0.8
        assert!((score.confidence_score - 0.8).abs() < 1e-12);
        assert!(analyzer.promotes(&score));
        assert_eq!(score.sample_size, 5);
    }

    proptest! {
        #[test]
        fn prop_confidence_monotone_in_success_count(
            total in 2usize..200,
            successes in 0usize..199,
            consistency in 0.0f64..=1.0,
        ) {
            let successes = successes.min(total - 1);
            let lower = confidence(successes, total, consistency);
            let higher = confidence(successes + 1, total, consistency);
            prop_assert!(higher >= lower);
        }

        #[test]
        fn prop_confidence_bounded(
            total in 1usize..500,
            successes in 0usize..500,
            consistency in 0.0f64..=1.0,
        ) {
            let successes = successes.min(total);
            let value = confidence(successes, total, consistency);
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }
}
