//! Export command - write detected patterns to a file

use anyhow::Result;

use super::detect;
use crate::cli::app::ExportArgs;

/// Run detection and persist the pattern store
pub async fn execute(args: ExportArgs) -> Result<()> {
    let pipeline = detect(&args.path).await?;

    let store = pipeline.store();
    store.persist(&args.output).await?;

    println!(
        "Exported {} patterns ({} active) to {}",
        store.len(),
        pipeline.active_patterns().len(),
        args.output.display()
    );
    Ok(())
}
