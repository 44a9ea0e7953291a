//! Digital signatures
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Signature algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519 signature algorithm
    Ed25519,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::Ed25519 => write!(f, "Ed25519"),
        }
    }
}

/// Digital signature with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// The signature algorithm used
    pub algorithm: SignatureAlgorithm,
    /// The raw signature bytes
    #[serde(serialize_with = "to_hex", deserialize_with = "from_hex")]
    pub value: Vec<u8>,
}

impl Signature {
    /// Create a new signature
    pub fn new(algorithm: SignatureAlgorithm, value: Vec<u8>) -> Self {
        Self { algorithm, value }
    }

    /// Signature value as hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.value)
    }
}

fn to_hex<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(value))
}

fn from_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    hex::decode(encoded).map_err(serde::de::Error::custom)
}
