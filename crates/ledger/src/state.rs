//! Ledger states
//!
//! An [`IouState`] is immutable: paying it down or moving it to a new lender
//! produces a new revision with the same [`LinearId`], which a transaction
//! then uses to replace the previous revision.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use iou_crypto::PublicKey;

use crate::amount::Amount;
use crate::party::Party;
use crate::LedgerResult;

/// Identifier shared by every revision of the same IOU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinearId(Uuid);

impl LinearId {
    /// Create a new random linear ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LinearId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An obligation of `borrower` to repay `amount` to `lender`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IouState {
    /// Amount owed, fixed at issuance
    pub amount: Amount,
    /// Party owed the money
    pub lender: Party,
    /// Party owing the money
    pub borrower: Party,
    /// Amount repaid so far, in the currency of `amount`
    pub paid: Amount,
    /// Stable across revisions
    pub linear_id: LinearId,
}

impl IouState {
    /// A fresh, unpaid IOU with a new linear ID
    pub fn new(amount: Amount, lender: Party, borrower: Party) -> Self {
        let paid = Amount::zero(amount.currency().clone());
        Self {
            amount,
            lender,
            borrower,
            paid,
            linear_id: LinearId::new(),
        }
    }

    /// The lender and the borrower, in that order
    pub fn participants(&self) -> Vec<Party> {
        vec![self.lender.clone(), self.borrower.clone()]
    }

    pub fn participant_keys(&self) -> Vec<PublicKey> {
        vec![self.lender.owning_key, self.borrower.owning_key]
    }

    /// Amount still owed
    pub fn remaining(&self) -> LedgerResult<Amount> {
        self.amount.checked_sub(&self.paid)
    }

    /// A new revision with `payment` added to `paid`.
    ///
    /// Whether the result over-pays the IOU is a contract rule; this only
    /// refuses a payment in another currency.
    pub fn pay(&self, payment: &Amount) -> LedgerResult<Self> {
        Ok(Self {
            paid: self.paid.checked_add(payment)?,
            ..self.clone()
        })
    }

    /// A new revision owed to `new_lender`
    pub fn with_new_lender(&self, new_lender: Party) -> Self {
        Self {
            lender: new_lender,
            ..self.clone()
        }
    }
}

/// A state owned by some other contract, carried as an opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignState {
    /// Identifier of the contract that governs this state
    pub contract: String,
    pub participants: Vec<Party>,
    pub data: serde_json::Value,
}

/// Any state a transaction can consume or create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerState {
    Iou(IouState),
    Foreign(ForeignState),
}

impl LedgerState {
    pub fn as_iou(&self) -> Option<&IouState> {
        match self {
            LedgerState::Iou(iou) => Some(iou),
            LedgerState::Foreign(_) => None,
        }
    }

    pub fn participants(&self) -> Vec<Party> {
        match self {
            LedgerState::Iou(iou) => iou.participants(),
            LedgerState::Foreign(foreign) => foreign.participants.clone(),
        }
    }
}

impl From<IouState> for LedgerState {
    fn from(iou: IouState) -> Self {
        LedgerState::Iou(iou)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Currency;
    use crate::LedgerError;
    use iou_crypto::KeyPair;

    fn party(name: &str) -> Party {
        Party::new(name, KeyPair::generate().public_key())
    }

    #[test]
    fn test_new_iou_is_unpaid() {
        let iou = IouState::new(
            Amount::from_units(100, Currency::gbp()),
            party("Alice"),
            party("Bob"),
        );

        assert!(iou.paid.is_zero());
        assert_eq!(iou.paid.currency(), iou.amount.currency());
        assert_eq!(iou.participants(), vec![iou.lender.clone(), iou.borrower.clone()]);
        assert_eq!(iou.remaining().unwrap(), iou.amount);
    }

    #[test]
    fn test_pay_keeps_identity() {
        let iou = IouState::new(
            Amount::from_units(100, Currency::gbp()),
            party("Alice"),
            party("Bob"),
        );

        let paid = iou.pay(&Amount::from_units(30, Currency::gbp())).unwrap();
        assert_eq!(paid.paid, Amount::from_units(30, Currency::gbp()));
        assert_eq!(paid.linear_id, iou.linear_id);
        assert_eq!(paid.amount, iou.amount);
        assert_eq!(paid.remaining().unwrap(), Amount::from_units(70, Currency::gbp()));
    }

    #[test]
    fn test_pay_in_other_currency_fails() {
        let iou = IouState::new(
            Amount::from_units(100, Currency::gbp()),
            party("Alice"),
            party("Bob"),
        );

        let result = iou.pay(&Amount::from_units(30, Currency::usd()));
        assert!(matches!(result, Err(LedgerError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_with_new_lender_changes_only_lender() {
        let iou = IouState::new(
            Amount::from_units(100, Currency::gbp()),
            party("Alice"),
            party("Bob"),
        )
        .pay(&Amount::from_units(10, Currency::gbp()))
        .unwrap();
        let charlie = party("Charlie");

        let moved = iou.with_new_lender(charlie.clone());
        assert_eq!(moved.lender, charlie);
        assert_eq!(moved.borrower, iou.borrower);
        assert_eq!(moved.amount, iou.amount);
        assert_eq!(moved.paid, iou.paid);
        assert_eq!(moved.linear_id, iou.linear_id);
    }

    #[test]
    fn test_ledger_state_tagging() {
        let iou = IouState::new(
            Amount::from_units(1, Currency::gbp()),
            party("Alice"),
            party("Bob"),
        );
        let state = LedgerState::from(iou.clone());
        assert_eq!(state.as_iou(), Some(&iou));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "iou");

        let foreign = LedgerState::Foreign(ForeignState {
            contract: "cash".to_string(),
            participants: vec![iou.lender.clone()],
            data: serde_json::json!({ "owner": "Alice" }),
        });
        assert!(foreign.as_iou().is_none());
        assert_eq!(foreign.participants(), vec![iou.lender]);
    }
}
