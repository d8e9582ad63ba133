//! Outcome records and the outcome source seam
//!
//! `OutcomeRecord` is owned by the outcome-recording collaborator; the
//! engine reads it and never mutates it. `OutcomeSource` is the injectable
//! seam through which recorded history reaches the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::content::{self, ContentElements};
use crate::Result;

/// Terminal result of a client journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Pending,
}

/// Duration measurements captured while the journey ran
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingFactors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_view_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touch_count: Option<u32>,
}

impl TimingFactors {
    /// Duration used for consistency scoring, preferring the full journey
    pub fn primary_duration(&self) -> Option<f64> {
        self.journey_duration_secs.or(self.engagement_duration_secs)
    }

    /// Drop non-finite measurements; a corrupt duration is treated as
    /// unrecorded rather than poisoning variance computation downstream
    pub fn sanitized(self) -> Self {
        let finite = |d: Option<f64>| d.filter(|v| v.is_finite());
        Self {
            journey_duration_secs: finite(self.journey_duration_secs),
            engagement_duration_secs: finite(self.engagement_duration_secs),
            time_to_first_view_secs: finite(self.time_to_first_view_secs),
            touch_count: self.touch_count,
        }
    }
}

/// One journey's recorded result; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub journey_id: String,
    pub hypothesis: String,
    pub content_elements: ContentElements,
    #[serde(default)]
    pub timing_factors: TimingFactors,
    pub outcome: Outcome,
    pub recorded_at: DateTime<Utc>,
}

/// Raw event pushed by the outcome-recording collaborator when a journey
/// concludes or changes status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    pub journey_id: String,
    #[serde(default)]
    pub hypothesis: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub content_snapshot: Value,
    #[serde(default)]
    pub timing_metrics: TimingFactors,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeEvent {
    /// Parse the content snapshot and freeze the event into a record
    pub fn into_record(self) -> OutcomeRecord {
        OutcomeRecord {
            journey_id: self.journey_id,
            hypothesis: self.hypothesis,
            content_elements: content::parse(&self.content_snapshot),
            timing_factors: self.timing_metrics.sanitized(),
            outcome: self.outcome,
            recorded_at: self.recorded_at,
        }
    }
}

/// Source of recorded outcome history
///
/// Production wires this to the persistence collaborator; tests and
/// development use the in-memory implementation below.
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    async fn load_history(&self) -> Result<Vec<OutcomeRecord>>;
}

/// In-memory outcome source
#[derive(Debug, Default)]
pub struct InMemoryOutcomeSource {
    records: RwLock<Vec<OutcomeRecord>>,
}

impl InMemoryOutcomeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<OutcomeRecord>) -> Self {
        Self { records: RwLock::new(records) }
    }

    pub async fn push(&self, record: OutcomeRecord) {
        self.records.write().await.push(record);
    }
}

#[async_trait]
impl OutcomeSource for InMemoryOutcomeSource {
    async fn load_history(&self) -> Result<Vec<OutcomeRecord>> {
        Ok(self.records.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_into_record_parses_content() {
        let event = OutcomeEvent {
            journey_id: "j-1".to_string(),
            hypothesis: "urgency language".to_string(),
            outcome: Outcome::Success,
            content_snapshot: json!({ "headline": "Act now", "benefits": ["Fast"] }),
            timing_metrics: TimingFactors {
                journey_duration_secs: Some(3600.0),
                ..Default::default()
            },
            recorded_at: Utc::now(),
        };

        let record = event.into_record();
        assert_eq!(record.content_elements.headline.as_deref(), Some("Act now"));
        assert_eq!(record.timing_factors.primary_duration(), Some(3600.0));
        assert_eq!(record.outcome, Outcome::Success);
    }

    #[test]
    fn test_into_record_drops_non_finite_durations() {
        let event = OutcomeEvent {
            journey_id: "j-bad".to_string(),
            hypothesis: "noisy measurements".to_string(),
            outcome: Outcome::Failure,
            content_snapshot: json!({}),
            timing_metrics: TimingFactors {
                journey_duration_secs: Some(f64::NAN),
                engagement_duration_secs: Some(f64::INFINITY),
                time_to_first_view_secs: Some(1.5),
                touch_count: Some(2),
            },
            recorded_at: Utc::now(),
        };

        let record = event.into_record();
        assert_eq!(record.timing_factors.journey_duration_secs, None);
        assert_eq!(record.timing_factors.engagement_duration_secs, None);
        assert_eq!(record.timing_factors.time_to_first_view_secs, Some(1.5));
        assert_eq!(record.timing_factors.touch_count, Some(2));
        assert_eq!(record.timing_factors.primary_duration(), None);
    }

    #[test]
    fn test_event_deserializes_collaborator_payload() {
        let payload = json!({
            "journeyId": "j-2",
            "outcome": "failure",
            "contentSnapshot": { "headline": "Hello" },
            "timingMetrics": { "journeyDurationSecs": 120.5 },
            "recordedAt": "2026-08-01T12:00:00Z"
        });

        let event: OutcomeEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.outcome, Outcome::Failure);
        assert!(event.hypothesis.is_empty());
        assert_eq!(event.timing_metrics.journey_duration_secs, Some(120.5));
    }

    #[tokio::test]
    async fn test_in_memory_source_round_trip() {
        let source = InMemoryOutcomeSource::new();
        source
            .push(OutcomeRecord {
                journey_id: "j-3".to_string(),
                hypothesis: "social proof".to_string(),
                content_elements: ContentElements::default(),
                timing_factors: TimingFactors::default(),
                outcome: Outcome::Pending,
                recorded_at: Utc::now(),
            })
            .await;

        let history = source.load_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].journey_id, "j-3");
    }
}
