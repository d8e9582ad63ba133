//! Watch command - replay outcomes and stream every engine update

use anyhow::Result;
use funnel_insight_core::{DetectionPipeline, EngineConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::load_events;
use crate::cli::app::WatchArgs;

/// Replay a history file event by event, printing each broadcast message
/// as it would reach a live subscriber
pub async fn execute(args: WatchArgs) -> Result<()> {
    let events = load_events(&args.path).await?;
    println!("Replaying {} outcome events", events.len());

    let pipeline = DetectionPipeline::new(EngineConfig::default());
    let mut rx = pipeline.broadcaster().subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => match serde_json::to_string(&message) {
                    Ok(line) => println!("{}", line),
                    Err(error) => warn!(%error, "failed to serialize update"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "printer lagged behind the update stream");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for event in events {
        pipeline.ingest(event).await?;
    }

    let metrics = pipeline.metrics().await;
    drop(pipeline);
    printer.await?;

    println!(
        "Done: {} events, {} detection runs, {} promotions, {} deactivations",
        metrics.events_ingested,
        metrics.detection_runs,
        metrics.patterns_promoted,
        metrics.patterns_deactivated
    );
    Ok(())
}
