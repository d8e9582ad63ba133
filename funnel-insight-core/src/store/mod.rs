//! Pattern store
//!
//! Authoritative, versioned collection of identified success patterns.
//! The detection pipeline is the single logical writer; readers always see
//! a consistent snapshot because lookups clone the stored value while the
//! DashMap entry lock is held. Deactivation flips a flag so the history of
//! a discredited pattern stays retrievable by id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cluster::TimingBucket;
use crate::content::{ContentElements, ElementType};
use crate::{EngineError, Result};

/// Kind of knowledge a pattern encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Hypothesis,
    ContentElement,
    Timing,
    Mixed,
}

/// Element-level performance record owned by a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternElement {
    pub element_type: ElementType,
    pub element_content: String,
    pub element_hash: u64,
    pub success_count: usize,
    pub total_count: usize,
}

impl PatternElement {
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_count as f64
        }
    }
}

/// Representative data the pattern generalizes over
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representative_hypothesis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_elements: Option<ContentElements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_bucket: Option<TimingBucket>,
}

/// The unit of learned knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessPattern {
    pub id: Uuid,
    /// Canonical cluster key, kept so re-scoring maps back to the same id
    pub pattern_key: String,
    pub pattern_type: PatternType,
    pub pattern_data: PatternData,
    pub confidence_score: f64,
    pub sample_size: usize,
    pub success_rate: f64,
    pub statistical_significance: f64,
    pub identified_at: DateTime<Utc>,
    pub last_validated: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<PatternElement>,
}

/// Read filter for the query surface
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    pub pattern_type: Option<PatternType>,
    pub min_confidence: Option<f64>,
}

impl PatternFilter {
    fn matches(&self, pattern: &SuccessPattern) -> bool {
        if let Some(pattern_type) = self.pattern_type {
            if pattern.pattern_type != pattern_type {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if pattern.confidence_score < min {
                return false;
            }
        }
        true
    }
}

/// Serialized form of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreExport {
    pub version: String,
    pub patterns: Vec<SuccessPattern>,
    pub exported_at: DateTime<Utc>,
}

/// Concurrent pattern store with per-pattern entry locking
#[derive(Debug, Default)]
pub struct PatternStore {
    patterns: DashMap<Uuid, SuccessPattern>,
    key_index: DashMap<String, Uuid>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable id for a pattern-defining key; assigned on first sight and
    /// never regenerated afterwards
    pub fn id_for_key(&self, key: &str) -> Uuid {
        *self.key_index.entry(key.to_string()).or_insert_with(Uuid::new_v4)
    }

    /// Insert or update a pattern
    ///
    /// `identified_at` is preserved from the first creation;
    /// `last_validated` is refreshed on every upsert. Returns the stored
    /// snapshot.
    pub fn upsert(&self, mut pattern: SuccessPattern) -> Result<SuccessPattern> {
        pattern.last_validated = Utc::now();
        self.key_index.insert(pattern.pattern_key.clone(), pattern.id);

        let mut entry = self.patterns.entry(pattern.id).or_insert_with(|| {
            debug!(id = %pattern.id, key = %pattern.pattern_key, "pattern created");
            pattern.clone()
        });

        let existing = entry.value_mut();
        pattern.identified_at = existing.identified_at;
        *existing = pattern.clone();

        Ok(pattern)
    }

    pub fn get(&self, id: &Uuid) -> Option<SuccessPattern> {
        self.patterns.get(id).map(|entry| entry.value().clone())
    }

    pub fn get_by_key(&self, key: &str) -> Option<SuccessPattern> {
        let id = *self.key_index.get(key)?.value();
        self.get(&id)
    }

    /// Active patterns, highest confidence first
    pub fn list_active(&self) -> Vec<SuccessPattern> {
        let mut patterns: Vec<SuccessPattern> = self
            .patterns
            .iter()
            .filter(|entry| entry.value().is_active)
            .map(|entry| entry.value().clone())
            .collect();

        patterns.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        patterns
    }

    /// Active patterns matching a filter, highest confidence first
    pub fn query(&self, filter: &PatternFilter) -> Vec<SuccessPattern> {
        self.list_active().into_iter().filter(|p| filter.matches(p)).collect()
    }

    /// Soft-delete: the pattern stays retrievable by id
    pub fn deactivate(&self, id: &Uuid) -> Result<SuccessPattern> {
        let mut entry = self
            .patterns
            .get_mut(id)
            .ok_or_else(|| EngineError::Store(format!("pattern {} not found", id)))?;

        let pattern = entry.value_mut();
        if pattern.is_active {
            pattern.is_active = false;
            pattern.last_validated = Utc::now();
            info!(id = %id, key = %pattern.pattern_key, "pattern deactivated");
        }
        Ok(pattern.clone())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn export(&self) -> StoreExport {
        StoreExport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            patterns: self.patterns.iter().map(|entry| entry.value().clone()).collect(),
            exported_at: Utc::now(),
        }
    }

    pub fn import(&self, export: StoreExport) -> Result<()> {
        validate_version(&export.version)?;

        let count = export.patterns.len();
        for pattern in export.patterns {
            self.key_index.insert(pattern.pattern_key.clone(), pattern.id);
            self.patterns.insert(pattern.id, pattern);
        }

        info!(count, "imported patterns");
        Ok(())
    }

    pub async fn persist(&self, path: &Path) -> Result<()> {
        let export = self.export();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&export)?;
        tokio::fs::write(path, json).await?;

        debug!(path = %path.display(), count = export.patterns.len(), "persisted pattern store");
        Ok(())
    }

    pub async fn load(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let export: StoreExport = serde_json::from_str(&json)?;
        self.import(export)
    }
}

fn validate_version(found: &str) -> Result<()> {
    let current = env!("CARGO_PKG_VERSION");
    let major = |v: &str| v.split('.').next().map(str::to_string);

    if major(current) != major(found) {
        return Err(EngineError::Version { found: found.to_string(), current: current.to_string() });
    }
    Ok(())
}
