//! Detection pipeline
//!
//! Composes the clustering engine, statistical analyzer, pattern store,
//! recommendation generator, and broadcaster into the ingest-to-update
//! flow. Each ingested outcome triggers a full detection pass over the
//! recorded history; detection passes are serialized so concurrent ingests
//! cannot interleave partial store updates.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, CachedPatterns};
use crate::cluster::{CandidatePattern, ClusterEngine, PatternKey};
use crate::content;
use crate::outcome::{Outcome, OutcomeEvent, OutcomeRecord, OutcomeSource};
use crate::recommend::{Recommendation, RecommendationFilter, RecommendationGenerator};
use crate::stats::StatisticalAnalyzer;
use crate::store::{
    PatternData, PatternElement, PatternFilter, PatternStore, PatternType, SuccessPattern,
};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum token-overlap for hypothesis clustering
    pub similarity_threshold: f64,
    /// Successful journeys a group needs before it is scored
    pub min_group_size: usize,
    /// No-effect success rate the z-test compares against
    pub baseline_rate: f64,
    /// Confidence a candidate must strictly exceed to become a pattern
    pub activation_threshold: f64,
    /// Broadcast channel capacity per subscriber
    pub channel_capacity: usize,
    /// How long a cached pattern snapshot stays fresh
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            min_group_size: 3,
            baseline_rate: 0.5,
            activation_threshold: 0.7,
            channel_capacity: 256,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

/// Counters accumulated over the pipeline's lifetime
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub events_ingested: u64,
    pub events_skipped: u64,
    pub detection_runs: u64,
    pub fallback_runs: u64,
    pub patterns_promoted: u64,
    pub patterns_deactivated: u64,
}

/// Outcome of one detection pass
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    pub record_count: usize,
    pub candidates: usize,
    pub promoted: Vec<Uuid>,
    pub deactivated: Vec<Uuid>,
    pub fallback_used: bool,
}

pub struct DetectionPipeline {
    config: EngineConfig,
    clusterer: ClusterEngine,
    analyzer: StatisticalAnalyzer,
    store: Arc<PatternStore>,
    recommendations: Arc<RecommendationGenerator>,
    broadcaster: Arc<Broadcaster>,
    history: RwLock<Vec<OutcomeRecord>>,
    detection_lock: Mutex<()>,
    metrics: RwLock<EngineMetrics>,
}

impl DetectionPipeline {
    pub fn new(config: EngineConfig) -> Self {
        let clusterer = ClusterEngine::new(config.similarity_threshold, config.min_group_size);
        let analyzer = StatisticalAnalyzer::new(config.baseline_rate, config.activation_threshold);
        let broadcaster = Arc::new(Broadcaster::new(config.channel_capacity, config.cache_ttl));
        Self {
            config,
            clusterer,
            analyzer,
            store: Arc::new(PatternStore::new()),
            recommendations: Arc::new(RecommendationGenerator::new()),
            broadcaster,
            history: RwLock::new(Vec::new()),
            detection_lock: Mutex::new(()),
            metrics: RwLock::new(EngineMetrics::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<PatternStore> {
        Arc::clone(&self.store)
    }

    pub fn recommendations(&self) -> Arc<RecommendationGenerator> {
        Arc::clone(&self.recommendations)
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub async fn metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    /// Record one concluded journey and run a detection pass.
    ///
    /// Pending events carry no terminal outcome yet and are skipped; the
    /// collaborator re-sends them once the journey concludes.
    pub async fn ingest(&self, event: OutcomeEvent) -> Result<ProcessReport> {
        if event.outcome == Outcome::Pending {
            debug!(journey_id = %event.journey_id, "skipping pending outcome");
            self.metrics.write().await.events_skipped += 1;
            return Ok(ProcessReport::default());
        }

        let record = event.into_record();
        let journey_id = record.journey_id.clone();
        {
            let mut history = self.history.write().await;
            history.push(record);
        }
        self.metrics.write().await.events_ingested += 1;

        self.publish_conversion_update().await;

        let report = self.run_detection().await?;
        debug!(
            %journey_id,
            promoted = report.promoted.len(),
            deactivated = report.deactivated.len(),
            "processed outcome"
        );
        Ok(report)
    }

    /// Replace the recorded history from an outcome source and re-detect
    pub async fn load_from(&self, source: &dyn OutcomeSource) -> Result<ProcessReport> {
        let records = source.load_history().await?;
        info!(count = records.len(), "loaded outcome history");
        {
            let mut history = self.history.write().await;
            *history = records;
        }
        self.run_detection().await
    }

    /// Full detection pass over the recorded history.
    ///
    /// Passes are serialized; the store, recommendations, and broadcast
    /// stream always reflect one consistent pass.
    pub async fn run_detection(&self) -> Result<ProcessReport> {
        let _guard = self.detection_lock.lock().await;
        let history = self.history.read().await.clone();

        let (candidates, fallback_used) = match self.clusterer.find_candidate_patterns(&history) {
            Ok(candidates) => (candidates, false),
            Err(error) => {
                warn!(%error, "clustering failed, falling back to coarse matching");
                (self.clusterer.coarse_candidates(&history), true)
            }
        };

        let mut report = ProcessReport {
            record_count: history.len(),
            candidates: candidates.len(),
            fallback_used,
            ..ProcessReport::default()
        };

        let mut promoted_keys = Vec::new();
        for candidate in &candidates {
            let score = self.analyzer.score(candidate);
            if !self.analyzer.promotes(&score) {
                continue;
            }

            let key = candidate.key.canonical();
            let first_promotion = self.store.get_by_key(&key).is_none();
            let pattern = self.build_pattern(candidate, &key, &score);
            let stored = self.store.upsert(pattern)?;

            self.recommendations.regenerate(&stored);
            self.broadcaster.pattern_updated(&stored)?;
            if first_promotion {
                info!(pattern_id = %stored.id, %key, "new pattern identified");
                self.broadcaster.new_alert(&stored)?;
            }

            promoted_keys.push(key);
            report.promoted.push(stored.id);
        }

        // Previously active patterns that no longer clear the threshold,
        // or whose group dissolved entirely, are retired in place.
        for active in self.store.list_active() {
            if promoted_keys.contains(&active.pattern_key) {
                continue;
            }
            // The coarse pass only re-evaluates hypothesis groups, so a
            // fallback run carries no contradicting evidence against
            // element or timing patterns; leave them standing.
            if fallback_used && !active.pattern_key.starts_with("hypothesis:") {
                continue;
            }
            let retired = self.store.deactivate(&active.id)?;
            self.recommendations.deactivate_for_pattern(&retired.id);
            self.broadcaster.pattern_updated(&retired)?;
            info!(pattern_id = %retired.id, key = %retired.pattern_key, "pattern deactivated");
            report.deactivated.push(retired.id);
        }

        let mut metrics = self.metrics.write().await;
        metrics.detection_runs += 1;
        if fallback_used {
            metrics.fallback_runs += 1;
        }
        metrics.patterns_promoted += report.promoted.len() as u64;
        metrics.patterns_deactivated += report.deactivated.len() as u64;

        Ok(report)
    }

    /// Active patterns ranked by confidence
    pub fn active_patterns(&self) -> Vec<SuccessPattern> {
        self.store.list_active()
    }

    pub fn patterns(&self, filter: &PatternFilter) -> Vec<SuccessPattern> {
        self.store.query(filter)
    }

    /// Single-pattern lookup; retired patterns stay retrievable by id
    pub fn pattern(&self, id: &Uuid) -> Option<SuccessPattern> {
        self.store.get(id)
    }

    pub fn recommendation_list(&self, filter: &RecommendationFilter) -> Vec<Recommendation> {
        self.recommendations.list(filter)
    }

    /// Cached active-pattern view for read-heavy collaborators
    pub fn cached_patterns(&self) -> CachedPatterns {
        self.broadcaster.cache().read_with(|| Ok(self.store.list_active()))
    }

    async fn publish_conversion_update(&self) {
        let history = self.history.read().await;
        let concluded =
            history.iter().filter(|r| r.outcome != Outcome::Pending).count();
        let successes = history.iter().filter(|r| r.outcome == Outcome::Success).count();
        let rate = if concluded == 0 { 0.0 } else { successes as f64 / concluded as f64 };
        drop(history);

        self.broadcaster.conversion_update(json!({
            "totalJourneys": concluded,
            "successCount": successes,
            "successRate": rate,
        }));
    }

    fn build_pattern(
        &self,
        candidate: &CandidatePattern,
        key: &str,
        score: &crate::stats::PatternScore,
    ) -> SuccessPattern {
        let now = chrono::Utc::now();
        let (pattern_data, elements) = describe_candidate(candidate);
        let pattern_type = pattern_type_for(&candidate.key, &elements);

        SuccessPattern {
            id: self.store.id_for_key(key),
            pattern_key: key.to_string(),
            pattern_type,
            pattern_data,
            confidence_score: score.confidence_score,
            sample_size: score.sample_size,
            success_rate: score.success_rate,
            statistical_significance: score.statistical_significance,
            identified_at: now,
            last_validated: now,
            is_active: true,
            elements,
        }
    }
}

impl Default for DetectionPipeline {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn pattern_type_for(key: &PatternKey, elements: &[PatternElement]) -> PatternType {
    match key {
        // A hypothesis group whose journeys also share tracked content
        // elements encodes both kinds of knowledge.
        PatternKey::Hypothesis { .. } if !elements.is_empty() => PatternType::Mixed,
        PatternKey::Hypothesis { .. } => PatternType::Hypothesis,
        PatternKey::ContentElement { .. } => PatternType::ContentElement,
        PatternKey::Timing { .. } => PatternType::Timing,
    }
}

/// Representative data and element-level stats for a scored candidate
fn describe_candidate(candidate: &CandidatePattern) -> (PatternData, Vec<PatternElement>) {
    match &candidate.key {
        PatternKey::Hypothesis { normalized } => {
            let data = PatternData {
                representative_hypothesis: Some(normalized.clone()),
                ..PatternData::default()
            };
            (data, element_stats(candidate, None))
        }
        PatternKey::ContentElement { element_type, element_hash, .. } => {
            let data = PatternData {
                content_elements: candidate.members.first().map(|m| m.content_elements.clone()),
                ..PatternData::default()
            };
            (data, element_stats(candidate, Some((*element_type, *element_hash))))
        }
        PatternKey::Timing { bucket } => {
            let data = PatternData { timing_bucket: Some(*bucket), ..PatternData::default() };
            (data, Vec::new())
        }
    }
}

/// Per-element success tallies across a candidate's members and failures,
/// optionally restricted to one element identity
fn element_stats(
    candidate: &CandidatePattern,
    only: Option<(crate::content::ElementType, u64)>,
) -> Vec<PatternElement> {
    let mut stats: Vec<PatternElement> = Vec::new();

    let mut tally = |record: &OutcomeRecord, success: bool| {
        for (element_type, text) in record.content_elements.typed_elements() {
            let hash = content::element_hash(text);
            if let Some((want_type, want_hash)) = only {
                if element_type != want_type || hash != want_hash {
                    continue;
                }
            }
            match stats
                .iter_mut()
                .find(|e| e.element_type == element_type && e.element_hash == hash)
            {
                Some(entry) => {
                    entry.total_count += 1;
                    if success {
                        entry.success_count += 1;
                    }
                }
                None => stats.push(PatternElement {
                    element_type,
                    element_content: text.to_string(),
                    element_hash: hash,
                    success_count: usize::from(success),
                    total_count: 1,
                }),
            }
        }
    };

    for record in &candidate.members {
        tally(record, true);
    }
    for record in &candidate.failures {
        tally(record, false);
    }

    stats
}
