use std::path::Path;

use anyhow::Context;
use tracing::info;

use iou::core::common::{logging, NodeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::load().context("Failed to load configuration")?;
    logging::init_logging(
        &config.log_level,
        config.log_dir.as_deref().map(Path::new),
        "iou-node",
    )?;

    info!("Starting iou-node {}", iou::version::VERSION);
    let stx = iou::run_issuance(&config).await?;

    let iou_state = stx.tx.outputs.first().and_then(|state| state.as_iou());
    match iou_state {
        Some(state) => info!(
            "Committed transaction {} for IOU {} ({} owed by {} to {})",
            stx.id()?,
            state.linear_id,
            state.amount,
            state.borrower,
            state.lender
        ),
        None => info!("Committed transaction {}", stx.id()?),
    }

    Ok(())
}
