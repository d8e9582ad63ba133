// Module for command implementations

pub mod analyze;
pub mod export;
pub mod recommend;
pub mod watch;

use anyhow::{Context, Result};
use funnel_insight_core::outcome::OutcomeEvent;
use funnel_insight_core::{DetectionPipeline, EngineConfig};
use funnel_insight_core::outcome::InMemoryOutcomeSource;
use tokio::fs;

/// Read an outcome history file: a JSON array of events, or one event per
/// line
pub(crate) async fn load_events(path: &str) -> Result<Vec<OutcomeEvent>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read outcome history: {}", path))?;

    if let Ok(events) = serde_json::from_str::<Vec<OutcomeEvent>>(&content) {
        return Ok(events);
    }

    let mut events = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: OutcomeEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid outcome event on line {}", number + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Detect patterns over a history file in a single pass
pub(crate) async fn detect(path: &str) -> Result<DetectionPipeline> {
    let events = load_events(path).await?;
    let records = events.into_iter().map(|e| e.into_record()).collect();
    let source = InMemoryOutcomeSource::with_records(records);

    let pipeline = DetectionPipeline::new(EngineConfig::default());
    pipeline.load_from(&source).await?;
    Ok(pipeline)
}
