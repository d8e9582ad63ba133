//! Similarity and clustering engine
//!
//! Groups outcome records into candidate patterns by hypothesis text
//! similarity, content-element fingerprints, and timing buckets. Grouping
//! is deterministic over input order, which the pattern store relies on
//! for stable pattern identity.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::content::{self, ElementType};
use crate::outcome::{Outcome, OutcomeRecord};
use crate::{EngineError, Result};

/// Conversion-speed buckets for timing patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingBucket {
    UnderFiveMinutes,
    UnderOneHour,
    UnderOneDay,
    OverOneDay,
}

impl TimingBucket {
    pub fn from_secs(secs: f64) -> Self {
        if secs < 300.0 {
            TimingBucket::UnderFiveMinutes
        } else if secs < 3600.0 {
            TimingBucket::UnderOneHour
        } else if secs < 86_400.0 {
            TimingBucket::UnderOneDay
        } else {
            TimingBucket::OverOneDay
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimingBucket::UnderFiveMinutes => "under_five_minutes",
            TimingBucket::UnderOneHour => "under_one_hour",
            TimingBucket::UnderOneDay => "under_one_day",
            TimingBucket::OverOneDay => "over_one_day",
        }
    }

    /// Human wording used in timing recommendations
    pub fn describe(&self) -> &'static str {
        match self {
            TimingBucket::UnderFiveMinutes => "journeys that convert within five minutes",
            TimingBucket::UnderOneHour => "journeys that convert within the first hour",
            TimingBucket::UnderOneDay => "journeys that convert within one day",
            TimingBucket::OverOneDay => "journeys that take longer than a day",
        }
    }
}

/// The pattern-defining key a group clusters around
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKey {
    Hypothesis { normalized: String },
    ContentElement { element_type: ElementType, element_hash: u64, content: String },
    Timing { bucket: TimingBucket },
}

impl PatternKey {
    /// Canonical string used by the store's key-to-id index
    pub fn canonical(&self) -> String {
        match self {
            PatternKey::Hypothesis { normalized } => format!("hypothesis:{}", normalized),
            PatternKey::ContentElement { element_type, element_hash, .. } => {
                format!("element:{}:{}", element_type, element_hash)
            }
            PatternKey::Timing { bucket } => format!("timing:{}", bucket.label()),
        }
    }
}

/// A group of similar records dense enough to be scored
#[derive(Debug, Clone)]
pub struct CandidatePattern {
    pub key: PatternKey,
    /// Successful records in the group, in arrival order
    pub members: Vec<OutcomeRecord>,
    /// Failed records matching the same key
    pub failures: Vec<OutcomeRecord>,
    pub created_seq: u64,
}

impl CandidatePattern {
    pub fn success_count(&self) -> usize {
        self.members.len()
    }

    pub fn total_attempts(&self) -> usize {
        self.members.len() + self.failures.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_attempts() == 0 {
            0.0
        } else {
            self.members.len() as f64 / self.total_attempts() as f64
        }
    }
}

struct HypothesisGroup {
    tokens: HashSet<String>,
    normalized: String,
    members: Vec<OutcomeRecord>,
    failures: Vec<OutcomeRecord>,
    seq: u64,
}

struct ElementGroup {
    element_type: ElementType,
    element_hash: u64,
    content: String,
    members: Vec<OutcomeRecord>,
    failures: Vec<OutcomeRecord>,
    seq: u64,
}

struct TimingGroup {
    bucket: TimingBucket,
    members: Vec<OutcomeRecord>,
    failures: Vec<OutcomeRecord>,
    seq: u64,
}

/// Clustering engine configuration and entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEngine {
    /// Minimum token-overlap (Jaccard) for hypothesis similarity
    pub similarity_threshold: f64,
    /// Successful members required before a group becomes a candidate
    pub min_group_size: usize,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self { similarity_threshold: 0.6, min_group_size: 3 }
    }
}

impl ClusterEngine {
    pub fn new(similarity_threshold: f64, min_group_size: usize) -> Self {
        Self { similarity_threshold, min_group_size }
    }

    /// Full clustering pass over recorded history
    ///
    /// Fails when a record carries a non-finite duration, which would
    /// poison downstream variance computation; the caller is expected to
    /// answer with [`ClusterEngine::coarse_candidates`].
    pub fn find_candidate_patterns(
        &self,
        history: &[OutcomeRecord],
    ) -> Result<Vec<CandidatePattern>> {
        for record in history {
            if let Some(duration) = record.timing_factors.primary_duration() {
                if !duration.is_finite() {
                    return Err(EngineError::Detection(format!(
                        "non-finite duration on journey {}",
                        record.journey_id
                    )));
                }
            }
        }

        let mut candidates = Vec::new();
        let mut seq = 0u64;

        candidates.extend(self.hypothesis_candidates(history, &mut seq));
        candidates.extend(self.element_candidates(history, &mut seq));
        candidates.extend(self.timing_candidates(history, &mut seq));

        debug!(count = candidates.len(), "clustering pass produced candidates");
        Ok(candidates)
    }

    /// Fallback pass: exact normalized-hypothesis equality only
    ///
    /// Coarser than the main pass but immune to malformed timing data, so
    /// a single bad record never blocks pattern updates for other groups.
    pub fn coarse_candidates(&self, history: &[OutcomeRecord]) -> Vec<CandidatePattern> {
        let mut groups: Vec<HypothesisGroup> = Vec::new();

        for record in history {
            let normalized = content::normalize(&record.hypothesis);
            if normalized.is_empty() {
                continue;
            }

            let position = groups.iter().position(|g| g.normalized == normalized);
            let group = match position {
                Some(idx) => &mut groups[idx],
                None => {
                    groups.push(HypothesisGroup {
                        tokens: HashSet::new(),
                        normalized,
                        members: Vec::new(),
                        failures: Vec::new(),
                        seq: groups.len() as u64,
                    });
                    groups.last_mut().expect("group just pushed")
                }
            };

            match record.outcome {
                Outcome::Success => group.members.push(record.clone()),
                Outcome::Failure => group.failures.push(record.clone()),
                Outcome::Pending => {}
            }
        }

        groups
            .into_iter()
            .filter(|g| g.members.len() >= self.min_group_size)
            .map(|g| CandidatePattern {
                key: PatternKey::Hypothesis { normalized: g.normalized },
                members: g.members,
                failures: g.failures,
                created_seq: g.seq,
            })
            .collect()
    }

    fn hypothesis_candidates(
        &self,
        history: &[OutcomeRecord],
        seq: &mut u64,
    ) -> Vec<CandidatePattern> {
        let mut groups: Vec<HypothesisGroup> = Vec::new();

        // Successes first so group density reflects wins, then failures
        // attach to whichever group they resemble.
        for record in history.iter().filter(|r| r.outcome == Outcome::Success) {
            self.assign_hypothesis(record, &mut groups, seq, true);
        }
        for record in history.iter().filter(|r| r.outcome == Outcome::Failure) {
            self.assign_hypothesis(record, &mut groups, seq, false);
        }

        groups
            .into_iter()
            .filter(|g| g.members.len() >= self.min_group_size)
            .map(|g| CandidatePattern {
                key: PatternKey::Hypothesis { normalized: g.normalized },
                members: g.members,
                failures: g.failures,
                created_seq: g.seq,
            })
            .collect()
    }

    fn assign_hypothesis(
        &self,
        record: &OutcomeRecord,
        groups: &mut Vec<HypothesisGroup>,
        seq: &mut u64,
        create_if_missing: bool,
    ) {
        let normalized = content::normalize(&record.hypothesis);
        if normalized.is_empty() {
            return;
        }
        let tokens: HashSet<String> = normalized.split(' ').map(str::to_string).collect();

        // Denser cluster wins; on equal counts the most recently created
        // group takes the record. max_by_key keeps the last maximum, and
        // groups are stored in creation order, so the tuple encodes both
        // rules.
        let best = groups
            .iter_mut()
            .filter(|g| jaccard(&tokens, &g.tokens) >= self.similarity_threshold)
            .max_by_key(|g| (g.members.len(), g.seq));

        match best {
            Some(group) => {
                if record.outcome == Outcome::Success {
                    group.members.push(record.clone());
                } else {
                    group.failures.push(record.clone());
                }
            }
            None if create_if_missing => {
                groups.push(HypothesisGroup {
                    tokens,
                    normalized,
                    members: vec![record.clone()],
                    failures: Vec::new(),
                    seq: *seq,
                });
                *seq += 1;
            }
            None => {}
        }
    }

    fn element_candidates(
        &self,
        history: &[OutcomeRecord],
        seq: &mut u64,
    ) -> Vec<CandidatePattern> {
        let mut groups: Vec<ElementGroup> = Vec::new();

        // Successes define the groups; failures attach afterwards so group
        // membership does not depend on interleaving order.
        for record in history.iter().filter(|r| r.outcome == Outcome::Success) {
            for (element_type, element_content) in record.content_elements.typed_elements() {
                let hash = content::element_hash(element_content);
                let position = groups
                    .iter()
                    .position(|g| g.element_type == element_type && g.element_hash == hash);

                match position {
                    Some(idx) => groups[idx].members.push(record.clone()),
                    None => {
                        groups.push(ElementGroup {
                            element_type,
                            element_hash: hash,
                            content: element_content.to_string(),
                            members: vec![record.clone()],
                            failures: Vec::new(),
                            seq: *seq,
                        });
                        *seq += 1;
                    }
                }
            }
        }

        for record in history.iter().filter(|r| r.outcome == Outcome::Failure) {
            for (element_type, element_content) in record.content_elements.typed_elements() {
                let hash = content::element_hash(element_content);
                if let Some(group) = groups
                    .iter_mut()
                    .find(|g| g.element_type == element_type && g.element_hash == hash)
                {
                    group.failures.push(record.clone());
                }
            }
        }

        groups
            .into_iter()
            .filter(|g| g.members.len() >= self.min_group_size)
            .map(|g| CandidatePattern {
                key: PatternKey::ContentElement {
                    element_type: g.element_type,
                    element_hash: g.element_hash,
                    content: g.content,
                },
                members: g.members,
                failures: g.failures,
                created_seq: g.seq,
            })
            .collect()
    }

    fn timing_candidates(&self, history: &[OutcomeRecord], seq: &mut u64) -> Vec<CandidatePattern> {
        let mut groups: Vec<TimingGroup> = Vec::new();

        for record in history.iter().filter(|r| r.outcome == Outcome::Success) {
            let Some(duration) = record.timing_factors.primary_duration() else {
                continue;
            };
            let bucket = TimingBucket::from_secs(duration);

            match groups.iter().position(|g| g.bucket == bucket) {
                Some(idx) => groups[idx].members.push(record.clone()),
                None => {
                    groups.push(TimingGroup {
                        bucket,
                        members: vec![record.clone()],
                        failures: Vec::new(),
                        seq: *seq,
                    });
                    *seq += 1;
                }
            }
        }

        for record in history.iter().filter(|r| r.outcome == Outcome::Failure) {
            let Some(duration) = record.timing_factors.primary_duration() else {
                continue;
            };
            let bucket = TimingBucket::from_secs(duration);
            if let Some(group) = groups.iter_mut().find(|g| g.bucket == bucket) {
                group.failures.push(record.clone());
            }
        }

        groups
            .into_iter()
            .filter(|g| g.members.len() >= self.min_group_size)
            .map(|g| CandidatePattern {
                key: PatternKey::Timing { bucket: g.bucket },
                members: g.members,
                failures: g.failures,
                created_seq: g.seq,
            })
            .collect()
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}
