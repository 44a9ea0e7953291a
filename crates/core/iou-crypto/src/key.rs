//! Ed25519 signing keys and public keys
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::{
    Signature as DalekSignature, Signer as DalekSigner, SigningKey, Verifier as DalekVerifier,
    VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, Result};
use crate::hash::sha256;
use crate::signature::{Signature, SignatureAlgorithm};

/// An Ed25519 public key, identifying a signer
#[derive(Clone, Copy)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Create a public key from its 32 raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Ed25519 public keys are 32 bytes, got {}",
                bytes.len()
            ))
        })?;

        VerifyingKey::from_bytes(&raw)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid Ed25519 public key: {}", e)))
    }

    /// Parse a base58 encoded public key
    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| CryptoError::InvalidEncoding(format!("Invalid base58 key: {}", e)))?;

        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.as_bytes()).into_string()
    }

    /// Short hexadecimal fingerprint, used in logs
    pub fn fingerprint(&self) -> String {
        sha256(self.as_bytes()).to_hex()[0..16].to_string()
    }

    /// Verify a signature against a message.
    ///
    /// Returns `Ok(false)` for a well formed signature that does not match and
    /// an error when the signature bytes cannot be an Ed25519 signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<bool> {
        if signature.algorithm != SignatureAlgorithm::Ed25519 {
            return Err(CryptoError::InvalidSignature(format!(
                "Expected Ed25519 signature, got {}",
                signature.algorithm
            )));
        }

        let dalek_sig = DalekSignature::from_slice(&signature.value)
            .map_err(|e| CryptoError::InvalidSignature(format!("Invalid Ed25519 signature: {}", e)))?;

        Ok(self.0.verify(message, &dalek_sig).is_ok())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PublicKey {}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base58(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base58(&encoded).map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 key pair
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Restore a key pair from its 32 byte secret
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Ed25519 secret keys are 32 bytes, got {}",
                bytes.len()
            ))
        })?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature: DalekSignature = self.signing_key.sign(message);
        Signature::new(SignatureAlgorithm::Ed25519, signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.public_key().fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"test message");

        assert!(keypair.public_key().verify(b"test message", &signature).unwrap());
        assert!(!keypair.public_key().verify(b"wrong message", &signature).unwrap());

        let other = KeyPair::generate();
        assert!(!other.public_key().verify(b"test message", &signature).unwrap());
    }

    #[test]
    fn test_malformed_signature_is_an_error() {
        let keypair = KeyPair::generate();
        let truncated = Signature::new(SignatureAlgorithm::Ed25519, vec![1, 2, 3]);
        assert!(keypair.public_key().verify(b"message", &truncated).is_err());
    }

    #[test]
    fn test_restore_from_secret() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_secret_bytes(&keypair.signing_key.to_bytes()).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
        assert!(KeyPair::from_secret_bytes(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_base58_roundtrip_and_ordering() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();

        let parsed: PublicKey = a.to_base58().parse().unwrap();
        assert_eq!(parsed, a);
        assert_ne!(a, b);
        assert_eq!(a.cmp(&b), a.as_bytes().cmp(b.as_bytes()));
    }

    #[test]
    fn test_key_fingerprint() {
        let fingerprint = KeyPair::generate().public_key().fingerprint();
        assert_eq!(fingerprint.len(), 16);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
