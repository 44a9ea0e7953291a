//! IOU Ledger
//!
//! A two-party signed-obligation ledger: IOU states governed by a closed set
//! of contract commands, issued through a collected-signature flow and
//! finalized by a notary.

use anyhow::Context;
use tracing::info;

use iou_common::NodeConfig;
use iou_flows::InMemoryNetwork;
use iou_ledger::{Amount, Currency, IouState, SignedTransaction};

/// Module version information
pub mod version {
    /// The current version of the IOU library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Re-export core components for easy access
pub mod core {
    pub use iou_common as common;
    pub use iou_crypto as crypto;
}

pub use iou_flows as flows;
pub use iou_ledger as ledger;

/// Run the issuance described by `config` on an in-process network
pub async fn run_issuance(config: &NodeConfig) -> anyhow::Result<SignedTransaction> {
    let mut network = InMemoryNetwork::new(config.flow.clone());
    if let Some(dir) = &config.checkpoint_dir {
        network = network.with_checkpoint_dir(dir);
    }

    let issuance = &config.issuance;
    network.create_notary(&issuance.notary);
    let lender = network
        .create_node(&issuance.lender)
        .context("Failed to start lender node")?;
    let borrower = network
        .create_node(&issuance.borrower)
        .context("Failed to start borrower node")?;

    let currency = Currency::new(&issuance.currency).context("Invalid issuance currency")?;
    let iou = IouState::new(
        Amount::from_units(issuance.amount, currency),
        lender.party().clone(),
        borrower.party().clone(),
    );

    info!(
        "Issuing {} from {} to {} via {}",
        iou.amount, iou.lender, iou.borrower, issuance.notary
    );
    let stx = lender.issue(iou).await.context("Issuance failed")?;
    Ok(stx)
}
