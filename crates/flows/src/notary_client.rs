//! Notary access for flows
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use iou_ledger::{Party, SignedTransaction, SimpleNotary, TransactionSignature};

use crate::{FlowError, FlowResult};

/// Submits transactions to a notary
#[async_trait]
pub trait NotaryClient: Send + Sync {
    /// Ask `notary` to sign `stx`
    async fn notarise(
        &self,
        notary: &Party,
        stx: &SignedTransaction,
    ) -> FlowResult<TransactionSignature>;
}

/// Calls [`SimpleNotary`] instances living in the same process
#[derive(Default)]
pub struct InMemoryNotaryClient {
    notaries: RwLock<HashMap<String, Arc<SimpleNotary>>>,
}

impl InMemoryNotaryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, notary: Arc<SimpleNotary>) {
        self.notaries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(notary.identity().name.clone(), notary);
    }

    fn lookup(&self, notary: &Party) -> Option<Arc<SimpleNotary>> {
        self.notaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&notary.name)
            .cloned()
    }
}

#[async_trait]
impl NotaryClient for InMemoryNotaryClient {
    async fn notarise(
        &self,
        notary: &Party,
        stx: &SignedTransaction,
    ) -> FlowResult<TransactionSignature> {
        let service = self
            .lookup(notary)
            .ok_or_else(|| FlowError::NotaryUnavailable(format!("unknown notary {}", notary)))?;

        debug!("Submitting transaction to notary {}", notary);
        Ok(service.notarise(stx).await?)
    }
}
