//! Cryptographic primitives for the IOU ledger
//!
//! Ed25519 is the only signature scheme; SHA-256 is the only hash.

pub mod error;
pub mod hash;
pub mod key;
pub mod signature;

pub use error::{CryptoError, Result};
pub use hash::{sha256, SecureHash};
pub use key::{KeyPair, PublicKey};
pub use signature::{Signature, SignatureAlgorithm};
