//! Recommend command - list ranked recommendations

use anyhow::Result;
use funnel_insight_core::recommend::RecommendationFilter;

use super::detect;
use crate::cli::app::RecommendArgs;

/// Run detection and print recommendations, most urgent first
pub async fn execute(args: RecommendArgs) -> Result<()> {
    let pipeline = detect(&args.path).await?;

    let mut recommendations = pipeline.recommendation_list(&RecommendationFilter::default());
    if let Some(limit) = args.limit {
        recommendations.truncate(limit);
    }

    if recommendations.is_empty() {
        println!("No recommendations yet - not enough consistent wins in this history");
        return Ok(());
    }

    println!("{} recommendations:", recommendations.len());
    for recommendation in &recommendations {
        println!();
        println!(
            "[{:?}] {:?} (confidence {:.2})",
            recommendation.priority(),
            recommendation.recommendation_type,
            recommendation.confidence_score
        );
        println!("  expected improvement: {:+.1}%", recommendation.expected_improvement * 100.0);
        println!("  from pattern {}", recommendation.source_pattern_id);
        for item in &recommendation.action_items {
            println!("  - {}", item.description);
        }
    }

    Ok(())
}
