//! Identity directory
//!
//! The [`NetworkMap`] is shared by every node of an in-process network and
//! records which node hosts which party, plus the notaries on offer. Each
//! node sees it through a [`LocalIdentityService`] that knows its own node ID.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use iou_crypto::PublicKey;
use iou_ledger::Party;

/// Resolves names and keys to parties
pub trait IdentityService: Send + Sync {
    /// Parties hosted on this node
    fn our_identities(&self) -> Vec<Party>;

    fn well_known_party(&self, name: &str) -> Option<Party>;

    fn party_from_key(&self, key: &PublicKey) -> Option<Party>;

    /// Notaries in registration order
    fn notary_identities(&self) -> Vec<Party>;

    /// Whether `party` is hosted on this node
    fn is_local(&self, party: &Party) -> bool;
}

#[derive(Default)]
struct MapInner {
    parties: BTreeMap<String, (Party, String)>,
    notaries: Vec<Party>,
}

/// Directory of parties, the nodes hosting them, and notaries
#[derive(Default)]
pub struct NetworkMap {
    inner: RwLock<MapInner>,
}

impl NetworkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `party` is hosted by `node_id`
    pub fn register_party(&self, party: Party, node_id: &str) {
        debug!("Registering {} on node {}", party, node_id);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .parties
            .insert(party.name.clone(), (party, node_id.to_string()));
    }

    pub fn register_notary(&self, notary: Party) {
        debug!("Registering notary {}", notary);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.notaries.contains(&notary) {
            inner.notaries.push(notary);
        }
    }

    pub fn party(&self, name: &str) -> Option<Party> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.parties.get(name).map(|(party, _)| party.clone())
    }

    pub fn party_by_key(&self, key: &PublicKey) -> Option<Party> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .parties
            .values()
            .map(|(party, _)| party)
            .chain(inner.notaries.iter())
            .find(|party| party.owning_key == *key)
            .cloned()
    }

    pub fn notaries(&self) -> Vec<Party> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.notaries.clone()
    }

    /// The node hosting `party`, if the party is registered under that key
    pub fn node_of(&self, party: &Party) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .parties
            .get(&party.name)
            .filter(|(known, _)| known == party)
            .map(|(_, node_id)| node_id.clone())
    }

    pub fn parties_on(&self, node_id: &str) -> Vec<Party> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .parties
            .values()
            .filter(|(_, node)| node == node_id)
            .map(|(party, _)| party.clone())
            .collect()
    }
}

/// A node's view of the [`NetworkMap`]
pub struct LocalIdentityService {
    node_id: String,
    map: Arc<NetworkMap>,
}

impl LocalIdentityService {
    pub fn new(node_id: impl Into<String>, map: Arc<NetworkMap>) -> Self {
        Self {
            node_id: node_id.into(),
            map,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl IdentityService for LocalIdentityService {
    fn our_identities(&self) -> Vec<Party> {
        self.map.parties_on(&self.node_id)
    }

    fn well_known_party(&self, name: &str) -> Option<Party> {
        self.map.party(name)
    }

    fn party_from_key(&self, key: &PublicKey) -> Option<Party> {
        self.map.party_by_key(key)
    }

    fn notary_identities(&self) -> Vec<Party> {
        self.map.notaries()
    }

    fn is_local(&self, party: &Party) -> bool {
        self.map.node_of(party).as_deref() == Some(self.node_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_crypto::KeyPair;

    #[test]
    fn test_local_identity_resolution() {
        let map = Arc::new(NetworkMap::new());
        let alice = Party::new("Alice", KeyPair::generate().public_key());
        let bob = Party::new("Bob", KeyPair::generate().public_key());
        let notary = Party::new("Notary", KeyPair::generate().public_key());
        map.register_party(alice.clone(), "node-a");
        map.register_party(bob.clone(), "node-b");
        map.register_notary(notary.clone());

        let service = LocalIdentityService::new("node-a", map);
        assert!(service.is_local(&alice));
        assert!(!service.is_local(&bob));
        assert_eq!(service.our_identities(), vec![alice.clone()]);
        assert_eq!(service.well_known_party("Bob"), Some(bob.clone()));
        assert_eq!(service.party_from_key(&notary.owning_key), Some(notary.clone()));
        assert_eq!(service.notary_identities(), vec![notary]);

        let impostor = Party::new("Alice", KeyPair::generate().public_key());
        assert!(!service.is_local(&impostor));
    }
}
