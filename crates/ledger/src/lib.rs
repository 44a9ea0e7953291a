//! IOU Ledger
//!
//! This crate provides the ledger side of a two-party obligation system:
//! the IOU state, the contract rules that govern its issuance, transfer and
//! settlement, signed transactions, a vault of committed states and a
//! notary that prevents double spends.

use thiserror::Error;

use iou_crypto::CryptoError;

/// Error types for ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A contract rule was violated
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Arithmetic between amounts of different currencies
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch {
        /// Currency of the left-hand amount
        expected: String,
        /// Currency of the right-hand amount
        found: String,
    },

    /// Invalid amount or currency
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed transaction
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Required signatures are missing
    #[error("Missing signatures from: {0}")]
    SignatureMissing(String),

    /// A signature does not verify
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

pub mod amount;
pub mod contract;
pub mod notary;
pub mod party;
pub mod state;
pub mod transaction;
pub mod vault;

// Re-exports
pub use amount::{Amount, Currency};
pub use contract::{Command, IouCommand};
pub use notary::{NotaryError, SimpleNotary};
pub use party::Party;
pub use state::{ForeignState, IouState, LedgerState, LinearId};
pub use transaction::{
    SignedTransaction, StateAndRef, StateRef, TransactionBuilder, TransactionSignature,
    WireTransaction,
};
pub use vault::{MemoryVault, Vault};
