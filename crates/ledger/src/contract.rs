//! The IOU contract
//!
//! Every transaction carries exactly one [`IouCommand`]. [`verify`] dispatches
//! on it and runs the matching rule; each rule is a plain function over the
//! transaction so that initiators, counterparties and the notary all run the
//! same checks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use iou_crypto::PublicKey;

use crate::state::IouState;
use crate::transaction::WireTransaction;
use crate::{LedgerError, LedgerResult};

/// What a transaction does to an IOU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IouCommand {
    /// Create a new IOU
    Issue,
    /// Replace the lender
    Transfer,
    /// Record a repayment, or retire a fully repaid IOU
    Settle,
}

/// A command together with the keys that must sign for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub value: IouCommand,
    pub signers: Vec<PublicKey>,
}

impl Command {
    pub fn new(value: IouCommand, signers: Vec<PublicKey>) -> Self {
        Self { value, signers }
    }

    fn signer_set(&self) -> BTreeSet<PublicKey> {
        self.signers.iter().copied().collect()
    }
}

/// Run the contract rules for `tx`
pub fn verify(tx: &WireTransaction) -> LedgerResult<()> {
    require(
        tx.commands.len() == 1,
        "a transaction must carry exactly one IOU command",
    )?;
    let command = &tx.commands[0];

    match command.value {
        IouCommand::Issue => verify_issue(tx, command),
        IouCommand::Transfer => verify_transfer(tx, command),
        IouCommand::Settle => verify_settle(tx, command),
    }
}

fn verify_issue(tx: &WireTransaction, command: &Command) -> LedgerResult<()> {
    require(
        tx.inputs.is_empty(),
        "no inputs should be consumed when issuing an IOU",
    )?;
    require(
        tx.outputs.len() == 1,
        "only one output state should be created when issuing an IOU",
    )?;
    let iou = tx.outputs[0]
        .as_iou()
        .ok_or_else(|| violation("the output of an issuance must be an IOU"))?;

    require(
        iou.amount.is_positive(),
        "a newly issued IOU must have a positive amount",
    )?;
    require(
        iou.paid.currency() == iou.amount.currency(),
        "the paid amount must be in the currency of the IOU",
    )?;
    require(
        iou.paid.is_zero(),
        "a newly issued IOU must not have been paid",
    )?;
    require_distinct_parties(iou)?;
    require(
        command.signer_set() == iou.participant_keys().into_iter().collect::<BTreeSet<_>>(),
        "both lender and borrower together only may sign an IOU issue transaction",
    )
}

fn verify_transfer(tx: &WireTransaction, command: &Command) -> LedgerResult<()> {
    let input = single_iou_input(tx, "transferring")?;
    require(
        tx.outputs.len() == 1,
        "an IOU transfer transaction should only create one output state",
    )?;
    let output = tx.outputs[0]
        .as_iou()
        .ok_or_else(|| violation("the output of a transfer must be an IOU"))?;

    require(
        output.lender != input.lender,
        "the lender property must change in a transfer",
    )?;
    require(
        *output == input.with_new_lender(output.lender.clone()),
        "only the lender property may change in a transfer",
    )?;
    require_distinct_parties(output)?;

    let expected: BTreeSet<PublicKey> = [
        input.lender.owning_key,
        output.lender.owning_key,
        input.borrower.owning_key,
    ]
    .into_iter()
    .collect();
    require(
        command.signer_set() == expected,
        "the borrower, old lender and new lender only must sign an IOU transfer transaction",
    )
}

fn verify_settle(tx: &WireTransaction, command: &Command) -> LedgerResult<()> {
    let input = single_iou_input(tx, "settling")?;
    require(
        tx.outputs.len() <= 1,
        "a settlement may create at most one output state",
    )?;

    match tx.outputs.first() {
        Some(state) => {
            let output = state
                .as_iou()
                .ok_or_else(|| violation("the output of a settlement must be an IOU"))?;
            require(
                output.linear_id == input.linear_id,
                "a settlement must keep the linear ID of the IOU",
            )?;
            require(
                output.paid.currency() == input.amount.currency(),
                "a settlement must be paid in the currency of the IOU",
            )?;
            require(
                output.paid.exceeds(&input.paid)?,
                "a settlement must increase the paid amount",
            )?;
            require(
                !output.paid.exceeds(&input.amount)?,
                "an IOU cannot be paid more than is owed",
            )?;
            let payment = output.paid.checked_sub(&input.paid)?;
            require(
                *output == input.pay(&payment)?,
                "only the paid property may change in a settlement",
            )?;
        }
        None => {
            require(
                input.remaining()?.is_zero(),
                "an IOU may only be retired once it is fully paid",
            )?;
        }
    }

    require(
        command.signer_set() == input.participant_keys().into_iter().collect::<BTreeSet<_>>(),
        "both lender and borrower together only must sign an IOU settle transaction",
    )
}

fn single_iou_input<'a>(tx: &'a WireTransaction, action: &str) -> LedgerResult<&'a IouState> {
    require(
        tx.inputs.len() == 1,
        &format!("exactly one IOU should be consumed when {} an IOU", action),
    )?;
    tx.inputs[0]
        .state
        .as_iou()
        .ok_or_else(|| violation(&format!("the input when {} must be an IOU", action)))
}

fn require_distinct_parties(iou: &IouState) -> LedgerResult<()> {
    require(
        iou.lender != iou.borrower && iou.lender.owning_key != iou.borrower.owning_key,
        "the lender and borrower cannot have the same identity",
    )
}

fn require(condition: bool, message: &str) -> LedgerResult<()> {
    if condition {
        Ok(())
    } else {
        Err(violation(message))
    }
}

fn violation(message: &str) -> LedgerError {
    LedgerError::ContractViolation(message.to_string())
}
