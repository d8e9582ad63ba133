use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "funnel-insight",
    version,
    about = "Funnel Insight - Recognize what makes client journeys convert",
    long_about = "Funnel Insight analyzes recorded journey outcomes, clusters similar wins, scores them statistically, and turns durable patterns into actionable recommendations."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect success patterns in recorded outcomes
    #[command(about = "Run pattern detection over a recorded outcome history")]
    Analyze(AnalyzeArgs),

    /// List actionable recommendations
    #[command(about = "Detect patterns and print ranked recommendations")]
    Recommend(RecommendArgs),

    /// Replay outcomes and stream engine updates
    #[command(about = "Replay an outcome history and print every broadcast update")]
    Watch(WatchArgs),

    /// Export detected patterns
    #[command(about = "Detect patterns and write the pattern store to a file")]
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Path to the outcome history (JSON array or JSON lines)
    #[arg(help = "Outcome history file to analyze")]
    pub path: String,

    /// Only show patterns at or above this confidence
    #[arg(long, help = "Minimum confidence score to display")]
    pub min_confidence: Option<f64>,

    /// Emit machine-readable JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RecommendArgs {
    /// Path to the outcome history (JSON array or JSON lines)
    #[arg(help = "Outcome history file to analyze")]
    pub path: String,

    /// Cap the number of recommendations shown
    #[arg(short, long, help = "Maximum recommendations to display")]
    pub limit: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Path to the outcome history (JSON array or JSON lines)
    #[arg(help = "Outcome history file to replay")]
    pub path: String,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Path to the outcome history (JSON array or JSON lines)
    #[arg(help = "Outcome history file to analyze")]
    pub path: String,

    /// Where to write the exported pattern store
    #[arg(short, long, help = "Output file for the pattern export")]
    pub output: PathBuf,
}
