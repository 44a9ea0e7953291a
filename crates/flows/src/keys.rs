//! Keys held by a node
use std::collections::BTreeMap;

use iou_crypto::{KeyPair, PublicKey, SecureHash};
use iou_ledger::TransactionSignature;

/// The signing keys a node holds, indexed by public key
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: BTreeMap<PublicKey, KeyPair>,
}

impl KeyStore {
    pub fn new(keys: impl IntoIterator<Item = KeyPair>) -> Self {
        Self {
            keys: keys.into_iter().map(|k| (k.public_key(), k)).collect(),
        }
    }

    pub fn owns(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Sign `id` with every key in `wanted` that this store holds
    pub fn sign_all<'a>(
        &self,
        id: &SecureHash,
        wanted: impl IntoIterator<Item = &'a PublicKey>,
    ) -> Vec<TransactionSignature> {
        wanted
            .into_iter()
            .filter_map(|key| self.keys.get(key))
            .map(|pair| TransactionSignature::create(pair, id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_all_skips_foreign_keys() {
        let ours = KeyPair::generate();
        let theirs = KeyPair::generate().public_key();
        let store = KeyStore::new(vec![ours.clone()]);
        let id = iou_crypto::sha256(b"tx");

        let sigs = store.sign_all(&id, &[ours.public_key(), theirs]);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].by, ours.public_key());
        assert!(sigs[0].verify(&id).is_ok());
        assert!(store.owns(&ours.public_key()));
        assert!(!store.owns(&theirs));
    }
}
