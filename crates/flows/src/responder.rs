//! Responding side of the IOU issuance flow
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use iou_crypto::SecureHash;
use iou_ledger::{LedgerError, Party, SignedTransaction, TransactionSignature};

use crate::messaging::{FlowMessage, InboundSession};
use crate::{FlowContext, FlowError, FlowResult};

/// Counters of what a responder has done
#[derive(Debug, Default)]
pub struct ResponderStats {
    signed: AtomicUsize,
    refused: AtomicUsize,
    recorded: AtomicUsize,
}

impl ResponderStats {
    /// Signature requests answered with signatures
    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    pub fn refused(&self) -> usize {
        self.refused.load(Ordering::SeqCst)
    }

    /// Finalized transactions recorded
    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }
}

/// Countersigns and records issuances proposed by other nodes
#[derive(Clone)]
pub struct IouIssueResponder {
    ctx: FlowContext,
    stats: Arc<ResponderStats>,
}

impl IouIssueResponder {
    pub fn new(ctx: FlowContext, stats: Arc<ResponderStats>) -> Self {
        Self { ctx, stats }
    }

    /// Serve one inbound session until the initiator is done with it
    pub async fn handle(&self, inbound: InboundSession) -> FlowResult<()> {
        let session = &inbound.session;
        let mut signed_id: Option<SecureHash> = None;

        loop {
            let message = match session.receive().await {
                Ok(message) => message,
                // The initiator closed the session
                Err(FlowError::Communication(_)) => return Ok(()),
                Err(e) => return Err(e),
            };

            match message {
                FlowMessage::SignatureRequest { transaction } => {
                    match self.countersign(&inbound.initiator, &transaction) {
                        Ok(signatures) => {
                            signed_id = Some(transaction.id()?);
                            session.send(FlowMessage::Signatures { signatures }).await?;
                            self.stats.signed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            warn!("Refusing to sign for {}: {}", inbound.initiator, e);
                            self.stats.refused.fetch_add(1, Ordering::SeqCst);
                            session
                                .send(FlowMessage::Refused {
                                    reason: e.to_string(),
                                })
                                .await?;
                            return Ok(());
                        }
                    }
                }
                FlowMessage::Finalized { transaction } => {
                    if let Err(e) = self.check_finalized(signed_id.as_ref(), &transaction) {
                        warn!("Not recording transaction from {}: {}", inbound.initiator, e);
                        self.stats.refused.fetch_add(1, Ordering::SeqCst);
                        session
                            .send(FlowMessage::Refused {
                                reason: e.to_string(),
                            })
                            .await?;
                        return Ok(());
                    }

                    let id = transaction.id()?;
                    self.ctx.vault.record_transaction(&transaction).await?;
                    self.stats.recorded.fetch_add(1, Ordering::SeqCst);
                    info!("Recorded transaction {} from {}", id, inbound.initiator);
                    session.send(FlowMessage::Recorded).await?;
                    return Ok(());
                }
                other => {
                    let reason = format!("unexpected {} message", other.kind());
                    session
                        .send(FlowMessage::Refused {
                            reason: reason.clone(),
                        })
                        .await?;
                    return Err(FlowError::Protocol(reason));
                }
            }
        }
    }

    /// Check a proposed issuance and sign it with our required keys
    fn countersign(
        &self,
        initiator: &Party,
        stx: &SignedTransaction,
    ) -> FlowResult<Vec<TransactionSignature>> {
        let id = stx.id()?;
        for sig in &stx.sigs {
            sig.verify(&id)?;
        }
        if !stx.signing_keys().contains(&initiator.owning_key) {
            return Err(LedgerError::SignatureMissing(format!(
                "{} has not signed the proposal",
                initiator
            ))
            .into());
        }

        let is_iou = stx.tx.outputs.len() == 1 && stx.tx.outputs[0].as_iou().is_some();
        if !is_iou {
            return Err(LedgerError::ContractViolation(
                "This must be an IOU transaction".to_string(),
            )
            .into());
        }
        stx.tx.verify()?;

        if !self.ctx.identity.notary_identities().contains(&stx.tx.notary) {
            return Err(FlowError::NotaryUnavailable(format!(
                "{} is not a known notary",
                stx.tx.notary
            )));
        }

        let already_signed = stx.signing_keys();
        let ours: Vec<_> = stx
            .tx
            .required_signing_keys()
            .into_iter()
            .filter(|key| self.ctx.keys.owns(key) && !already_signed.contains(key))
            .collect();
        if ours.is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "no signature is required from this node".to_string(),
            )
            .into());
        }

        debug!("Countersigning {} with {} key(s)", id, ours.len());
        Ok(self.ctx.keys.sign_all(&id, &ours))
    }

    /// A finalized transaction must be the one we signed and carry every
    /// signature, the notary's included
    fn check_finalized(
        &self,
        signed_id: Option<&SecureHash>,
        stx: &SignedTransaction,
    ) -> FlowResult<()> {
        let id = stx.id()?;
        if let Some(expected) = signed_id {
            if *expected != id {
                return Err(FlowError::Protocol(format!(
                    "finalized transaction {} is not the transaction {} we signed",
                    id, expected
                )));
            }
        }

        if !stx.signing_keys().iter().any(|key| self.ctx.keys.owns(key)) {
            return Err(FlowError::Protocol(format!(
                "transaction {} carries no signature of ours",
                id
            )));
        }

        stx.verify_signatures()?;
        Ok(())
    }
}
