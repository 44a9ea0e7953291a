//! Ledger identities
use std::fmt;

use serde::{Deserialize, Serialize};

use iou_crypto::PublicKey;

/// A well-known identity: a legal name and the key that signs on its behalf
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    /// The legal name, unique within a network
    pub name: String,
    /// The key whose signature authorizes actions by this party
    pub owning_key: PublicKey,
}

impl Party {
    /// Create a new party
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
