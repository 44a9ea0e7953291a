//! The IOU issuance flow
//!
//! The initiator builds an `Issue` transaction for a proposed IOU, signs it
//! with the keys its node holds, collects the remaining participants'
//! signatures, has the notary sign it and distributes the result. The flow
//! moves through [`FlowStage`]s and checkpoints after each one.

use tracing::{error, info, warn};

use iou_common::FlowSettings;
use iou_ledger::{
    Command, IouCommand, IouState, LedgerError, Party, SignedTransaction, TransactionBuilder,
};

use crate::checkpoint::{FlowCheckpoint, FlowId, FlowStage};
use crate::collect::{collect_signatures, open_sessions};
use crate::finality;
use crate::messaging::FlowSession;
use crate::{FlowContext, FlowError, FlowResult};

/// How the initiator picks the notary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotarySelection {
    /// The first notary in the directory
    First,
    /// The notary with this name
    Named(String),
}

impl From<&FlowSettings> for NotarySelection {
    fn from(settings: &FlowSettings) -> Self {
        match &settings.notary {
            Some(name) => NotarySelection::Named(name.clone()),
            None => NotarySelection::First,
        }
    }
}

/// Initiating side of an IOU issuance
pub struct IouIssueFlow {
    ctx: FlowContext,
    checkpoint: FlowCheckpoint,
    sessions: Vec<Box<dyn FlowSession>>,
}

impl IouIssueFlow {
    /// Prepare to issue `proposal`
    pub fn new(ctx: FlowContext, proposal: IouState) -> Self {
        Self {
            ctx,
            checkpoint: FlowCheckpoint::new(FlowId::new(), proposal),
            sessions: Vec::new(),
        }
    }

    pub fn id(&self) -> FlowId {
        self.checkpoint.flow_id
    }

    /// Run the flow to completion, returning the notarised transaction
    pub async fn call(self) -> FlowResult<SignedTransaction> {
        info!(
            "Flow {}: issuing {} from {} to {}",
            self.checkpoint.flow_id,
            self.checkpoint.proposal.amount,
            self.checkpoint.proposal.lender,
            self.checkpoint.proposal.borrower
        );
        self.save().await?;
        self.drive().await
    }

    /// Continue a flow from its last checkpoint
    pub async fn resume(ctx: FlowContext, flow_id: FlowId) -> FlowResult<SignedTransaction> {
        let checkpoint = ctx
            .checkpoints
            .load(&flow_id)
            .await?
            .ok_or_else(|| FlowError::Checkpoint(format!("no checkpoint for flow {}", flow_id)))?;

        info!("Flow {}: resuming at stage {}", flow_id, checkpoint.stage);
        Self {
            ctx,
            checkpoint,
            sessions: Vec::new(),
        }
        .drive()
        .await
    }

    async fn drive(mut self) -> FlowResult<SignedTransaction> {
        loop {
            match self.step().await {
                Ok(Some(done)) => return Ok(done),
                Ok(None) => self.save().await?,
                Err(e) => {
                    self.fail(&e).await;
                    return Err(e);
                }
            }
        }
    }

    /// Perform the work of the current stage; `Some` once committed
    async fn step(&mut self) -> FlowResult<Option<SignedTransaction>> {
        match self.checkpoint.stage.clone() {
            FlowStage::Building => {
                let notary = self.select_notary()?;
                let stx = self.build_and_sign(&notary)?;
                self.checkpoint.notary = Some(notary);
                self.checkpoint.partially_signed = Some(stx);
                self.checkpoint.advance(FlowStage::SelfSigned);
            }
            FlowStage::SelfSigned => {
                if self.counterparties().is_empty() {
                    let stx = self.partially_signed()?;
                    stx.verify_signatures_except(&[stx.tx.notary.owning_key])?;
                    self.checkpoint.fully_signed = Some(stx);
                    self.checkpoint.advance(FlowStage::FullySigned);
                } else {
                    self.checkpoint.advance(FlowStage::AwaitingCountersignature);
                }
            }
            FlowStage::AwaitingCountersignature => {
                let stx = self.partially_signed()?;
                self.connect().await?;
                let fully_signed = collect_signatures(&self.ctx, &stx, &self.sessions).await?;
                self.checkpoint.fully_signed = Some(fully_signed);
                self.checkpoint.advance(FlowStage::FullySigned);
            }
            FlowStage::FullySigned => {
                let stx = self.fully_signed()?;
                let notarised = finality::notarise(&self.ctx, &stx).await?;
                self.checkpoint.notarised = Some(notarised);
                self.checkpoint.advance(FlowStage::Finalizing);
            }
            FlowStage::Finalizing => {
                let notarised = self.notarised()?;
                self.connect().await?;
                match finality::record_and_broadcast(&self.ctx, &notarised, &self.sessions).await {
                    Ok(()) => {}
                    // Notarised means committed; a peer's answer cannot undo that
                    Err(e @ (FlowError::RecordRefused { .. } | FlowError::Protocol(_))) => {
                        warn!(
                            "Flow {}: committed without acknowledgement: {}",
                            self.checkpoint.flow_id, e
                        );
                    }
                    Err(e) => return Err(e),
                }
                self.sessions.clear();
                self.checkpoint.advance(FlowStage::Committed);
            }
            FlowStage::Committed => {
                let notarised = self.notarised()?;
                info!(
                    "Flow {}: committed transaction {}",
                    self.checkpoint.flow_id,
                    notarised.id()?
                );
                return Ok(Some(notarised));
            }
            FlowStage::Aborted { reason } => return Err(FlowError::Aborted(reason)),
        }

        Ok(None)
    }

    /// Record a failure. A notarised flow is never aborted, and transient
    /// failures once every participant has signed leave the flow resumable;
    /// anything else aborts it.
    async fn fail(&mut self, e: &FlowError) {
        let stage = &self.checkpoint.stage;
        if matches!(e, FlowError::Aborted(_)) {
            return;
        }

        let resumable = match stage {
            FlowStage::Finalizing | FlowStage::Committed => true,
            FlowStage::FullySigned => e.is_transient(),
            _ => false,
        };
        if resumable {
            warn!(
                "Flow {}: suspended at stage {}: {}",
                self.checkpoint.flow_id, stage, e
            );
        } else {
            error!(
                "Flow {}: aborted at stage {}: {}",
                self.checkpoint.flow_id, stage, e
            );
            self.checkpoint.advance(FlowStage::Aborted {
                reason: e.to_string(),
            });
        }

        if let Err(save_error) = self.save().await {
            error!(
                "Flow {}: could not record failure: {}",
                self.checkpoint.flow_id, save_error
            );
        }
    }

    async fn save(&self) -> FlowResult<()> {
        self.ctx.checkpoints.save(&self.checkpoint).await
    }

    fn select_notary(&self) -> FlowResult<Party> {
        let notaries = self.ctx.identity.notary_identities();
        match NotarySelection::from(&self.ctx.settings) {
            NotarySelection::First => notaries
                .into_iter()
                .next()
                .ok_or_else(|| FlowError::NotaryUnavailable("no notaries are known".to_string())),
            NotarySelection::Named(name) => notaries
                .into_iter()
                .find(|notary| notary.name == name)
                .ok_or_else(|| FlowError::NotaryUnavailable(format!("unknown notary {}", name))),
        }
    }

    /// Build the issuance, check it against the contract and sign it with
    /// every required key this node holds
    fn build_and_sign(&self, notary: &Party) -> FlowResult<SignedTransaction> {
        let proposal = &self.checkpoint.proposal;
        let tx = TransactionBuilder::new(notary.clone())
            .add_command(Command::new(IouCommand::Issue, proposal.participant_keys()))
            .add_output_state(proposal.clone())
            .to_wire_transaction();
        tx.verify()?;

        let id = tx.id()?;
        let required = tx.required_signing_keys();
        let sigs = self.ctx.keys.sign_all(&id, &required);
        if sigs.is_empty() {
            return Err(LedgerError::SignatureMissing(
                "this node holds none of the required signing keys".to_string(),
            )
            .into());
        }

        info!(
            "Flow {}: built transaction {} with {} local signature(s)",
            self.checkpoint.flow_id,
            id,
            sigs.len()
        );
        Ok(SignedTransaction::new(tx, sigs))
    }

    /// Participants hosted on other nodes
    fn counterparties(&self) -> Vec<Party> {
        self.checkpoint
            .proposal
            .participants()
            .into_iter()
            .filter(|party| !self.ctx.identity.is_local(party))
            .collect()
    }

    /// The participant this node acts as
    fn initiator(&self) -> FlowResult<Party> {
        self.checkpoint
            .proposal
            .participants()
            .into_iter()
            .find(|party| self.ctx.identity.is_local(party))
            .ok_or_else(|| {
                FlowError::Validation(LedgerError::InvalidTransaction(
                    "none of the participants is hosted on this node".to_string(),
                ))
            })
    }

    async fn connect(&mut self) -> FlowResult<()> {
        if self.sessions.is_empty() {
            let initiator = self.initiator()?;
            let counterparties = self.counterparties();
            self.sessions = open_sessions(&self.ctx, &initiator, &counterparties).await?;
        }
        Ok(())
    }

    fn partially_signed(&self) -> FlowResult<SignedTransaction> {
        checkpointed(&self.checkpoint.partially_signed, "partially signed")
    }

    fn fully_signed(&self) -> FlowResult<SignedTransaction> {
        checkpointed(&self.checkpoint.fully_signed, "fully signed")
    }

    fn notarised(&self) -> FlowResult<SignedTransaction> {
        checkpointed(&self.checkpoint.notarised, "notarised")
    }
}

fn checkpointed(stx: &Option<SignedTransaction>, what: &str) -> FlowResult<SignedTransaction> {
    stx.clone().ok_or_else(|| {
        FlowError::Checkpoint(format!("checkpoint is missing the {} transaction", what))
    })
}
