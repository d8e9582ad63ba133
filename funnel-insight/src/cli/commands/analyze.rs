//! Analyze command - detect success patterns in an outcome history

use anyhow::Result;
use funnel_insight_core::store::PatternFilter;

use super::detect;
use crate::cli::app::AnalyzeArgs;

/// Run detection and print the identified patterns
pub async fn execute(args: AnalyzeArgs) -> Result<()> {
    let pipeline = detect(&args.path).await?;

    let filter = PatternFilter { min_confidence: args.min_confidence, ..Default::default() };
    let patterns = pipeline.patterns(&filter);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&patterns)?);
        return Ok(());
    }

    let metrics = pipeline.metrics().await;
    println!("Analyzed {} patterns ({} active)", patterns.len(), pipeline.active_patterns().len());
    if metrics.fallback_runs > 0 {
        println!("Note: coarse matching was used because of malformed timing data");
    }

    for pattern in &patterns {
        println!();
        println!("Pattern {} [{:?}]", pattern.id, pattern.pattern_type);
        println!("  key:          {}", pattern.pattern_key);
        println!("  confidence:   {:.3}", pattern.confidence_score);
        println!(
            "  success rate: {:.1}% over {} journeys",
            pattern.success_rate * 100.0,
            pattern.sample_size
        );
        println!("  significance: p = {:.4}", pattern.statistical_significance);
        println!("  active:       {}", pattern.is_active);
        if let Some(hypothesis) = &pattern.pattern_data.representative_hypothesis {
            println!("  hypothesis:   {}", hypothesis);
        }
        if let Some(bucket) = pattern.pattern_data.timing_bucket {
            println!("  timing:       {}", bucket.describe());
        }
        for element in &pattern.elements {
            println!(
                "  element:      {} \"{}\" ({:.0}% of {} uses)",
                element.element_type,
                element.element_content,
                element.success_rate() * 100.0,
                element.total_count
            );
        }
    }

    Ok(())
}
