//! Tests for the IOU contract rules
//!
//! Each test builds a transaction by hand and checks that the contract
//! accepts or rejects it.

use iou_crypto::{KeyPair, SecureHash};
use iou_ledger::{
    contract, Amount, Command, Currency, ForeignState, IouCommand, IouState, LedgerError,
    LedgerState, Party, StateAndRef, StateRef, TransactionBuilder,
};

use proptest::prelude::*;

fn party(name: &str) -> Party {
    Party::new(name, KeyPair::generate().public_key())
}

fn gbp(units: u64) -> Amount {
    Amount::from_units(units, Currency::gbp())
}

struct Parties {
    alice: Party,
    bob: Party,
    charlie: Party,
    notary: Party,
}

fn parties() -> Parties {
    Parties {
        alice: party("Alice"),
        bob: party("Bob"),
        charlie: party("Charlie"),
        notary: party("Notary"),
    }
}

fn committed(iou: IouState) -> StateAndRef {
    StateAndRef {
        state: iou.into(),
        reference: StateRef::new(SecureHash::from_bytes([1u8; 32]), 0),
    }
}

fn assert_violation(result: Result<(), LedgerError>, fragment: &str) {
    match result {
        Err(LedgerError::ContractViolation(message)) => assert!(
            message.contains(fragment),
            "expected violation containing {:?}, got {:?}",
            fragment,
            message
        ),
        other => panic!("expected contract violation, got {:?}", other),
    }
}

#[test]
fn test_valid_issue() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let tx = TransactionBuilder::new(p.notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou)
        .to_wire_transaction();

    assert!(tx.verify().is_ok());
}

#[test]
fn test_issue_requires_single_command() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice, p.bob);

    let none = TransactionBuilder::new(p.notary.clone())
        .add_output_state(iou.clone())
        .to_wire_transaction();
    assert_violation(contract::verify(&none), "exactly one IOU command");

    let two = TransactionBuilder::new(p.notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou)
        .to_wire_transaction();
    assert_violation(contract::verify(&two), "exactly one IOU command");
}

#[test]
fn test_issue_rejects_zero_amount() {
    let p = parties();
    let iou = IouState::new(gbp(0), p.alice, p.bob);

    let tx = TransactionBuilder::new(p.notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou)
        .to_wire_transaction();

    assert_violation(tx.verify(), "positive amount");
}

#[test]
fn test_issue_rejects_same_lender_and_borrower() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.alice);

    let tx = TransactionBuilder::new(p.notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou)
        .to_wire_transaction();

    assert_violation(tx.verify(), "same identity");
}

#[test]
fn test_issue_rejects_shared_key() {
    let key = KeyPair::generate().public_key();
    let notary = party("Notary");
    let iou = IouState::new(gbp(100), Party::new("Alice", key), Party::new("Bob", key));

    let tx = TransactionBuilder::new(notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou)
        .to_wire_transaction();

    assert_violation(tx.verify(), "same identity");
}

#[test]
fn test_issue_rejects_wrong_signers() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let lender_only = TransactionBuilder::new(p.notary.clone())
        .add_command(Command::new(IouCommand::Issue, vec![p.alice.owning_key]))
        .add_output_state(iou.clone())
        .to_wire_transaction();
    assert_violation(lender_only.verify(), "only may sign");

    let extra = TransactionBuilder::new(p.notary)
        .add_command(Command::new(
            IouCommand::Issue,
            vec![p.alice.owning_key, p.bob.owning_key, p.charlie.owning_key],
        ))
        .add_output_state(iou)
        .to_wire_transaction();
    assert_violation(extra.verify(), "only may sign");
}

#[test]
fn test_issue_rejects_inputs_and_extra_outputs() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let with_input = TransactionBuilder::new(p.notary.clone())
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou.clone())
        .to_wire_transaction();
    assert_violation(with_input.verify(), "no inputs");

    let two_outputs = TransactionBuilder::new(p.notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou.clone())
        .add_output_state(iou)
        .to_wire_transaction();
    assert_violation(two_outputs.verify(), "only one output");
}

#[test]
fn test_issue_rejects_foreign_output() {
    let p = parties();
    let foreign = LedgerState::Foreign(ForeignState {
        contract: "cash".to_string(),
        participants: vec![p.alice.clone(), p.bob.clone()],
        data: serde_json::json!({ "amount": 100 }),
    });

    let tx = TransactionBuilder::new(p.notary)
        .add_command(Command::new(
            IouCommand::Issue,
            vec![p.alice.owning_key, p.bob.owning_key],
        ))
        .add_output_state(foreign)
        .to_wire_transaction();

    assert_violation(tx.verify(), "must be an IOU");
}

#[test]
fn test_issue_rejects_prepaid_iou() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice, p.bob).pay(&gbp(1)).unwrap();

    let tx = TransactionBuilder::new(p.notary)
        .add_command(Command::new(IouCommand::Issue, iou.participant_keys()))
        .add_output_state(iou)
        .to_wire_transaction();

    assert_violation(tx.verify(), "not have been paid");
}

#[test]
fn test_valid_transfer() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());
    let moved = iou.with_new_lender(p.charlie.clone());

    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou))
        .add_command(Command::new(
            IouCommand::Transfer,
            vec![p.alice.owning_key, p.bob.owning_key, p.charlie.owning_key],
        ))
        .add_output_state(moved)
        .to_wire_transaction();

    assert!(tx.verify().is_ok());
}

#[test]
fn test_transfer_must_change_only_lender() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());
    let signers = vec![p.alice.owning_key, p.bob.owning_key, p.charlie.owning_key];

    let unchanged = TransactionBuilder::new(p.notary.clone())
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Transfer, signers.clone()))
        .add_output_state(iou.clone())
        .to_wire_transaction();
    assert_violation(unchanged.verify(), "must change");

    let mut altered = iou.with_new_lender(p.charlie.clone());
    altered.amount = gbp(200);
    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou))
        .add_command(Command::new(IouCommand::Transfer, signers))
        .add_output_state(altered)
        .to_wire_transaction();
    assert_violation(tx.verify(), "only the lender");
}

#[test]
fn test_transfer_requires_new_lender_signature() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Transfer, iou.participant_keys()))
        .add_output_state(iou.with_new_lender(p.charlie))
        .to_wire_transaction();

    assert_violation(tx.verify(), "must sign");
}

#[test]
fn test_partial_settlement() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
        .add_output_state(iou.pay(&gbp(40)).unwrap())
        .to_wire_transaction();

    assert!(tx.verify().is_ok());
}

#[test]
fn test_settlement_cannot_overpay() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
        .add_output_state(iou.pay(&gbp(101)).unwrap())
        .to_wire_transaction();

    assert_violation(tx.verify(), "more than is owed");
}

#[test]
fn test_settlement_in_wrong_currency() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());
    let mut output = iou.clone();
    output.paid = Amount::from_units(10, Currency::usd());

    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
        .add_output_state(output)
        .to_wire_transaction();

    assert_violation(tx.verify(), "currency of the IOU");
}

#[test]
fn test_retire_requires_full_payment() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let early = TransactionBuilder::new(p.notary.clone())
        .add_input_state(committed(iou.pay(&gbp(99)).unwrap()))
        .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
        .to_wire_transaction();
    assert_violation(early.verify(), "fully paid");

    let done = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou.pay(&gbp(100)).unwrap()))
        .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
        .to_wire_transaction();
    assert!(done.verify().is_ok());
}

#[test]
fn test_input_consumed_twice_rejected() {
    let p = parties();
    let iou = IouState::new(gbp(100), p.alice.clone(), p.bob.clone());

    let tx = TransactionBuilder::new(p.notary)
        .add_input_state(committed(iou.clone()))
        .add_input_state(committed(iou.clone()))
        .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
        .add_output_state(iou.pay(&gbp(10)).unwrap())
        .to_wire_transaction();

    assert!(matches!(tx.verify(), Err(LedgerError::InvalidTransaction(_))));
}

proptest! {
    #[test]
    fn prop_settlement_within_amount_verifies(amount in 1u64..1_000_000, paid_frac in 1u64..=100) {
        let p = parties();
        let iou = IouState::new(gbp(amount), p.alice.clone(), p.bob.clone());
        let payment = std::cmp::max(1, amount * paid_frac / 100);
        let settled = iou.pay(&gbp(payment)).unwrap();
        prop_assert_eq!(settled.remaining().unwrap(), gbp(amount - payment));

        let tx = TransactionBuilder::new(p.notary)
            .add_input_state(committed(iou.clone()))
            .add_command(Command::new(IouCommand::Settle, iou.participant_keys()))
            .add_output_state(settled)
            .to_wire_transaction();
        prop_assert!(tx.verify().is_ok());
    }

    #[test]
    fn prop_payments_accumulate(first in 0u64..1_000_000, second in 0u64..1_000_000) {
        let p = parties();
        let iou = IouState::new(gbp(2_000_000), p.alice, p.bob);

        let paid_twice = iou.pay(&gbp(first)).unwrap().pay(&gbp(second)).unwrap();
        let expected = iou.paid.checked_add(&gbp(first)).unwrap().checked_add(&gbp(second)).unwrap();
        prop_assert_eq!(&paid_twice.paid, &expected);
        prop_assert_eq!(&paid_twice.paid, &gbp(first + second));
        prop_assert_eq!(paid_twice.linear_id, iou.linear_id);
        prop_assert_eq!(paid_twice.amount, iou.amount);
    }
}
