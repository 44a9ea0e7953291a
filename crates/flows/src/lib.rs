//! IOU Flows
//!
//! The two-party issuance workflow and the collaborators it runs against:
//! messaging sessions, an identity directory, a notary client, a key store
//! and a checkpoint store. Every collaborator is passed in explicitly through
//! a [`FlowContext`].

use std::sync::Arc;

use thiserror::Error;

use iou_common::FlowSettings;
use iou_ledger::{LedgerError, NotaryError, Vault};

pub mod checkpoint;
pub mod collect;
pub mod directory;
pub mod finality;
pub mod issue;
pub mod keys;
pub mod messaging;
pub mod node;
pub mod notary_client;
pub mod responder;

pub use checkpoint::{
    CheckpointStore, FileCheckpointStore, FlowCheckpoint, FlowId, FlowStage, MemoryCheckpointStore,
};
pub use directory::{IdentityService, LocalIdentityService, NetworkMap};
pub use issue::{IouIssueFlow, NotarySelection};
pub use keys::KeyStore;
pub use messaging::{FlowMessage, FlowSession, InboundSession, MessageEnvelope, MessagingService};
pub use node::{InMemoryNetwork, Node};
pub use notary_client::{InMemoryNotaryClient, NotaryClient};
pub use responder::{IouIssueResponder, ResponderStats};

/// Error types for flows
#[derive(Error, Debug)]
pub enum FlowError {
    /// The transaction failed local validation
    #[error("Validation failed: {0}")]
    Validation(#[from] LedgerError),

    /// A counterparty declined to sign
    #[error("{party} refused to sign: {reason}")]
    CounterpartyRefused { party: String, reason: String },

    /// A counterparty did not record a notarised transaction
    #[error("{party} did not record the transaction: {reason}")]
    RecordRefused { party: String, reason: String },

    /// The notary refused the transaction
    #[error("Notary rejected the transaction: {0}")]
    NotaryRejected(#[from] NotaryError),

    /// The notary could not be reached or is unknown
    #[error("Notary unavailable: {0}")]
    NotaryUnavailable(String),

    /// A session could not be opened or was closed
    #[error("Communication error: {0}")]
    Communication(String),

    /// A counterparty did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A counterparty sent something the protocol does not allow
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message encoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The flow was aborted earlier and cannot continue
    #[error("Flow aborted: {0}")]
    Aborted(String),
}

impl FlowError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FlowError::Communication(_) | FlowError::Timeout(_) | FlowError::NotaryUnavailable(_)
        )
    }
}

/// Result type for flows
pub type FlowResult<T> = Result<T, FlowError>;

/// Everything a flow needs from its node
#[derive(Clone)]
pub struct FlowContext {
    pub identity: Arc<dyn IdentityService>,
    pub keys: Arc<KeyStore>,
    pub messaging: Arc<dyn MessagingService>,
    pub notary_client: Arc<dyn NotaryClient>,
    pub vault: Arc<dyn Vault>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub settings: FlowSettings,
}
