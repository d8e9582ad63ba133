//! Core functionality for funnel-insight
//!
//! This crate contains the success pattern recognition engine: content
//! element parsing, outcome clustering, statistical scoring, the pattern
//! store, recommendation generation, and real-time update broadcasting.

pub mod broadcast;
pub mod cluster;
pub mod content;
pub mod outcome;
pub mod pipeline;
pub mod recommend;
pub mod stats;
pub mod store;

use thiserror::Error;

pub use broadcast::{BroadcastEventType, Broadcaster, EngineMessage};
pub use cluster::{CandidatePattern, ClusterEngine, PatternKey};
pub use content::{ContentElements, ElementType};
pub use outcome::{Outcome, OutcomeEvent, OutcomeRecord, OutcomeSource};
pub use pipeline::{DetectionPipeline, EngineConfig};
pub use recommend::{Recommendation, RecommendationGenerator};
pub use stats::{PatternScore, StatisticalAnalyzer};
pub use store::{PatternStore, SuccessPattern};

/// Typed failures surfaced to callers; statistical and parsing edge
/// cases are resolved locally and never reach this enum.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Broadcast error: {0}")]
    Broadcast(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Incompatible export version: {found} (current: {current})")]
    Version { found: String, current: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
