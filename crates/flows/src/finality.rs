//! Notarisation and distribution of a fully signed transaction
use tracing::{debug, info};

use iou_ledger::SignedTransaction;

use crate::messaging::{receive_within, FlowMessage, FlowSession};
use crate::{FlowContext, FlowError, FlowResult};

/// Have the transaction's notary sign it, returning the completed transaction
pub async fn notarise(ctx: &FlowContext, stx: &SignedTransaction) -> FlowResult<SignedTransaction> {
    let id = stx.id()?;
    let notary = &stx.tx.notary;

    let sig = ctx.notary_client.notarise(notary, stx).await?;
    if sig.by != notary.owning_key {
        return Err(FlowError::Protocol(format!(
            "notary {} answered with a signature by {}",
            notary, sig.by
        )));
    }

    let notarised = stx.with_additional_signatures(vec![sig]);
    notarised.verify_signatures()?;
    info!("Transaction {} notarised by {}", id, notary);
    Ok(notarised)
}

/// Record the notarised transaction locally and have every counterparty
/// record it too.
///
/// The local vault is written first. A counterparty that declines to record
/// yields `RecordRefused`; the transaction is committed regardless.
pub async fn record_and_broadcast(
    ctx: &FlowContext,
    notarised: &SignedTransaction,
    sessions: &[Box<dyn FlowSession>],
) -> FlowResult<()> {
    let id = notarised.id()?;
    if ctx.vault.record_transaction(notarised).await? {
        debug!("Recorded {} in the local vault", id);
    }

    for session in sessions {
        session
            .send(FlowMessage::Finalized {
                transaction: notarised.clone(),
            })
            .await?;
    }

    for session in sessions {
        let counterparty = session.counterparty();
        match receive_within(&**session, ctx.settings.response_timeout()).await? {
            FlowMessage::Recorded => debug!("{} recorded {}", counterparty, id),
            FlowMessage::Refused { reason } => {
                return Err(FlowError::RecordRefused {
                    party: counterparty.name.clone(),
                    reason,
                });
            }
            other => {
                return Err(FlowError::Protocol(format!(
                    "expected {} to acknowledge {}, got {}",
                    counterparty,
                    id,
                    other.kind()
                )));
            }
        }
    }

    Ok(())
}
