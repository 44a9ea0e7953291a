//! Vault of committed transactions
//!
//! The vault is a node's view of the ledger: every transaction it has
//! recorded, and the outputs of those transactions not yet consumed by a
//! later one.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use iou_crypto::SecureHash;

use crate::state::{IouState, LinearId};
use crate::transaction::{SignedTransaction, StateAndRef, StateRef};
use crate::LedgerResult;

/// Storage for committed transactions
#[async_trait]
pub trait Vault: Send + Sync {
    /// Record a finalized transaction; returns false if it was already recorded
    async fn record_transaction(&self, stx: &SignedTransaction) -> LedgerResult<bool>;

    /// Look up a recorded transaction by ID
    async fn transaction(&self, id: &SecureHash) -> LedgerResult<Option<SignedTransaction>>;

    /// All unconsumed IOU states
    async fn unconsumed_ious(&self) -> LedgerResult<Vec<StateAndRef>>;

    /// The latest unconsumed revision of an IOU
    async fn iou_by_linear_id(&self, linear_id: &LinearId) -> LedgerResult<Option<StateAndRef>>;
}

#[derive(Default)]
struct VaultInner {
    transactions: HashMap<SecureHash, SignedTransaction>,
    unconsumed: BTreeMap<StateRef, StateAndRef>,
}

/// In-memory vault
#[derive(Default)]
pub struct MemoryVault {
    inner: RwLock<VaultInner>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded transactions
    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn record_transaction(&self, stx: &SignedTransaction) -> LedgerResult<bool> {
        let id = stx.id()?;
        let mut inner = self.inner.write().await;
        if inner.transactions.contains_key(&id) {
            debug!("Transaction {} already recorded", id);
            return Ok(false);
        }

        for input in &stx.tx.inputs {
            inner.unconsumed.remove(&input.reference);
        }
        for index in 0..stx.tx.outputs.len() {
            let output = stx.tx.out_ref(index)?;
            inner.unconsumed.insert(output.reference, output);
        }
        inner.transactions.insert(id, stx.clone());

        debug!(
            "Recorded transaction {} ({} inputs, {} outputs)",
            id,
            stx.tx.inputs.len(),
            stx.tx.outputs.len()
        );
        Ok(true)
    }

    async fn transaction(&self, id: &SecureHash) -> LedgerResult<Option<SignedTransaction>> {
        Ok(self.inner.read().await.transactions.get(id).cloned())
    }

    async fn unconsumed_ious(&self) -> LedgerResult<Vec<StateAndRef>> {
        let inner = self.inner.read().await;
        Ok(inner
            .unconsumed
            .values()
            .filter(|s| s.state.as_iou().is_some())
            .cloned()
            .collect())
    }

    async fn iou_by_linear_id(&self, linear_id: &LinearId) -> LedgerResult<Option<StateAndRef>> {
        let inner = self.inner.read().await;
        Ok(inner
            .unconsumed
            .values()
            .find(|s| {
                s.state
                    .as_iou()
                    .map(|iou: &IouState| iou.linear_id == *linear_id)
                    .unwrap_or(false)
            })
            .cloned())
    }
}
