//! A single-node uniqueness notary
//!
//! The notary keeps the set of consumed state references. It signs a
//! transaction only if none of its inputs were consumed by a different
//! transaction, and then marks them consumed. Notarising the same
//! transaction again returns a fresh signature without error.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use iou_crypto::{KeyPair, SecureHash};

use crate::party::Party;
use crate::transaction::{SignedTransaction, StateRef, TransactionSignature};
use crate::LedgerError;

/// Reasons a notary refuses to sign
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotaryError {
    /// The transaction names another notary
    #[error("Wrong notary: transaction names {found}, this is {expected}")]
    WrongNotary { expected: String, found: String },

    /// An input was already consumed by another transaction
    #[error("Input {state_ref} was already consumed by {consumed_by}")]
    Conflict {
        state_ref: StateRef,
        consumed_by: SecureHash,
    },

    /// The transaction is not valid
    #[error("Invalid transaction: {0}")]
    Invalid(#[from] LedgerError),
}

/// Notary backed by an in-memory commit log
pub struct SimpleNotary {
    identity: Party,
    key: KeyPair,
    consumed: Mutex<HashMap<StateRef, SecureHash>>,
}

impl SimpleNotary {
    /// Create a notary with a fresh key
    pub fn new(name: impl Into<String>) -> Self {
        let key = KeyPair::generate();
        let identity = Party::new(name, key.public_key());
        Self {
            identity,
            key,
            consumed: Mutex::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &Party {
        &self.identity
    }

    /// Check `stx` and, if it spends nothing twice, sign it
    pub async fn notarise(
        &self,
        stx: &SignedTransaction,
    ) -> Result<TransactionSignature, NotaryError> {
        if stx.tx.notary != self.identity {
            return Err(NotaryError::WrongNotary {
                expected: self.identity.name.clone(),
                found: stx.tx.notary.name.clone(),
            });
        }

        let id = stx.id()?;
        stx.verify_signatures_except(&[self.identity.owning_key])?;
        stx.tx.verify()?;

        // Check and commit under one lock so two racing spends cannot both pass.
        let mut consumed = self.consumed.lock().await;
        for input in &stx.tx.inputs {
            if let Some(consumed_by) = consumed.get(&input.reference) {
                if *consumed_by != id {
                    warn!(
                        "Notary {} rejected {}: input {} already consumed by {}",
                        self.identity, id, input.reference, consumed_by
                    );
                    return Err(NotaryError::Conflict {
                        state_ref: input.reference,
                        consumed_by: *consumed_by,
                    });
                }
            }
        }
        for input in &stx.tx.inputs {
            consumed.insert(input.reference, id);
        }
        drop(consumed);

        debug!("Notary {} consumed {} inputs for {}", self.identity, stx.tx.inputs.len(), id);
        info!("Notary {} signed transaction {}", self.identity, id);

        Ok(TransactionSignature::create(&self.key, &id))
    }

    /// Whether `state_ref` has been consumed
    pub async fn is_consumed(&self, state_ref: &StateRef) -> bool {
        self.consumed.lock().await.contains_key(state_ref)
    }
}
