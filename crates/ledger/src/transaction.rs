//! Transactions
//!
//! A [`WireTransaction`] is the signable content of a transaction; its ID is
//! the SHA-256 of its canonical JSON encoding. A [`SignedTransaction`] pairs
//! it with the signatures collected so far.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use iou_crypto::{sha256, KeyPair, PublicKey, SecureHash, Signature};

use crate::contract::{self, Command};
use crate::party::Party;
use crate::state::LedgerState;
use crate::{LedgerError, LedgerResult};

/// Pointer to an output of a committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub txhash: SecureHash,
    pub index: u32,
}

impl StateRef {
    pub fn new(txhash: SecureHash, index: u32) -> Self {
        Self { txhash, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.txhash, self.index)
    }
}

/// A state together with where it was created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: LedgerState,
    pub reference: StateRef,
}

/// The signable content of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    /// States consumed, resolved to their contents
    pub inputs: Vec<StateAndRef>,
    /// States created
    pub outputs: Vec<LedgerState>,
    pub commands: Vec<Command>,
    /// The notary that guards against double spends of the inputs
    pub notary: Party,
    /// Makes otherwise identical transactions hash differently
    pub salt: Uuid,
}

impl WireTransaction {
    /// The transaction ID
    pub fn id(&self) -> LedgerResult<SecureHash> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Ok(sha256(&bytes))
    }

    /// Union of the signers of every command
    pub fn required_signing_keys(&self) -> BTreeSet<PublicKey> {
        self.commands
            .iter()
            .flat_map(|command| command.signers.iter().copied())
            .collect()
    }

    /// Reference to output `index` of this transaction
    pub fn out_ref(&self, index: usize) -> LedgerResult<StateAndRef> {
        let state = self.outputs.get(index).cloned().ok_or_else(|| {
            LedgerError::InvalidTransaction(format!(
                "Output index {} out of range ({} outputs)",
                index,
                self.outputs.len()
            ))
        })?;

        Ok(StateAndRef {
            state,
            reference: StateRef::new(self.id()?, index as u32),
        })
    }

    /// Run the contract rules over this transaction
    pub fn verify(&self) -> LedgerResult<()> {
        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(input.reference) {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Input {} is consumed twice",
                    input.reference
                )));
            }
        }

        contract::verify(self)
    }
}

/// A signature by `by` over a transaction ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub by: PublicKey,
    pub signature: Signature,
}

impl TransactionSignature {
    /// Sign a transaction ID
    pub fn create(key: &KeyPair, id: &SecureHash) -> Self {
        Self {
            by: key.public_key(),
            signature: key.sign(id.as_bytes()),
        }
    }

    /// Check the signature over `id`
    pub fn verify(&self, id: &SecureHash) -> LedgerResult<()> {
        match self.by.verify(id.as_bytes(), &self.signature) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(LedgerError::SignatureInvalid(format!(
                "signature by {} over {} does not verify",
                self.by, id
            ))),
        }
    }
}

/// A transaction and the signatures collected over it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub sigs: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: WireTransaction, sigs: Vec<TransactionSignature>) -> Self {
        Self { tx, sigs }
    }

    pub fn id(&self) -> LedgerResult<SecureHash> {
        self.tx.id()
    }

    /// A copy with `sigs` appended; a key that already signed is not added twice
    pub fn with_additional_signatures(
        &self,
        sigs: impl IntoIterator<Item = TransactionSignature>,
    ) -> Self {
        let mut signed = self.clone();
        for sig in sigs {
            if !signed.sigs.iter().any(|existing| existing.by == sig.by) {
                signed.sigs.push(sig);
            }
        }
        signed
    }

    /// Keys that have signed so far
    pub fn signing_keys(&self) -> BTreeSet<PublicKey> {
        self.sigs.iter().map(|sig| sig.by).collect()
    }

    /// Required signers, plus the notary, that have not yet signed
    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        let mut required = self.tx.required_signing_keys();
        required.insert(self.tx.notary.owning_key);

        let present = self.signing_keys();
        required.difference(&present).copied().collect()
    }

    /// Every required signature, the notary's included, is present and valid
    pub fn verify_signatures(&self) -> LedgerResult<()> {
        self.verify_signatures_except(&[])
    }

    /// Every present signature is valid and every required signer outside
    /// `allowed_to_be_missing` has signed
    pub fn verify_signatures_except(&self, allowed_to_be_missing: &[PublicKey]) -> LedgerResult<()> {
        let id = self.id()?;
        for sig in &self.sigs {
            sig.verify(&id)?;
        }

        let missing: Vec<String> = self
            .missing_signers()
            .into_iter()
            .filter(|key| !allowed_to_be_missing.contains(key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LedgerError::SignatureMissing(missing.join(", ")));
        }

        Ok(())
    }
}

/// Assembles a [`WireTransaction`]
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Party,
    inputs: Vec<StateAndRef>,
    outputs: Vec<LedgerState>,
    commands: Vec<Command>,
}

impl TransactionBuilder {
    pub fn new(notary: Party) -> Self {
        Self {
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn add_input_state(mut self, input: StateAndRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output_state(mut self, state: impl Into<LedgerState>) -> Self {
        self.outputs.push(state.into());
        self
    }

    pub fn add_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Freeze the builder into a transaction with a fresh salt
    pub fn to_wire_transaction(&self) -> WireTransaction {
        WireTransaction {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            commands: self.commands.clone(),
            notary: self.notary.clone(),
            salt: Uuid::new_v4(),
        }
    }

    /// Check the contract rules without signing anything
    pub fn verify(&self) -> LedgerResult<()> {
        self.to_wire_transaction().verify()
    }
}
