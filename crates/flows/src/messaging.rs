//! Flow messaging
//!
//! A session is an ordered, reliable, bidirectional channel between an
//! initiating flow and the node hosting a counterparty. Messages travel as
//! JSON-encoded [`MessageEnvelope`] bytes. The in-process [`SessionRouter`]
//! hands the far end of each new session to the counterparty node's inbox.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};
use uuid::Uuid;

use iou_ledger::{Party, SignedTransaction, TransactionSignature};

use crate::directory::NetworkMap;
use crate::{FlowError, FlowResult};

/// Messages exchanged by the issuance flow and its responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowMessage {
    /// Initiator asks for the counterparty's signatures
    SignatureRequest { transaction: SignedTransaction },
    /// Counterparty's signatures over the requested transaction
    Signatures { signatures: Vec<TransactionSignature> },
    /// Counterparty declines
    Refused { reason: String },
    /// The notarised transaction, for the counterparty to record
    Finalized { transaction: SignedTransaction },
    /// Counterparty has recorded the finalized transaction
    Recorded,
}

impl FlowMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowMessage::SignatureRequest { .. } => "signature_request",
            FlowMessage::Signatures { .. } => "signatures",
            FlowMessage::Refused { .. } => "refused",
            FlowMessage::Finalized { .. } => "finalized",
            FlowMessage::Recorded => "recorded",
        }
    }
}

/// Message envelope carrying the sender and the encoded message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub session_id: Uuid,
    /// Name of the sending party
    pub sender: String,
    /// The JSON-encoded [`FlowMessage`]
    pub payload: Vec<u8>,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl MessageEnvelope {
    /// Wrap a message
    pub fn new(session_id: Uuid, sender: &str, message: &FlowMessage) -> FlowResult<Self> {
        let payload =
            serde_json::to_vec(message).map_err(|e| FlowError::Serialization(e.to_string()))?;

        Ok(Self {
            session_id,
            sender: sender.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Decode the carried message
    pub fn message(&self) -> FlowResult<FlowMessage> {
        serde_json::from_slice(&self.payload).map_err(|e| FlowError::Serialization(e.to_string()))
    }

    /// Serialize the envelope to bytes
    pub fn to_bytes(&self) -> FlowResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FlowError::Serialization(e.to_string()))
    }

    /// Deserialize bytes to a message envelope
    pub fn from_bytes(bytes: &[u8]) -> FlowResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| FlowError::Serialization(e.to_string()))
    }
}

/// One end of a session with a counterparty
#[async_trait]
pub trait FlowSession: Send + Sync {
    fn session_id(&self) -> Uuid;

    /// The party at the other end
    fn counterparty(&self) -> &Party;

    async fn send(&self, message: FlowMessage) -> FlowResult<()>;

    /// Wait for the next message; fails with `Communication` once the other end is gone
    async fn receive(&self) -> FlowResult<FlowMessage>;
}

/// Opens sessions to counterparties
#[async_trait]
pub trait MessagingService: Send + Sync {
    async fn open_session(
        &self,
        initiator: &Party,
        counterparty: &Party,
    ) -> FlowResult<Box<dyn FlowSession>>;
}

/// Wait for the next message, failing with `Timeout` after `timeout`
pub async fn receive_within(
    session: &dyn FlowSession,
    timeout: Duration,
) -> FlowResult<FlowMessage> {
    match tokio::time::timeout(timeout, session.receive()).await {
        Ok(result) => result,
        Err(_) => Err(FlowError::Timeout(format!(
            "no response from {} within {:?}",
            session.counterparty(),
            timeout
        ))),
    }
}

/// Session end backed by a pair of channels
pub struct ChannelSession {
    session_id: Uuid,
    local: Party,
    counterparty: Party,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChannelSession {
    /// Two connected ends of a new session
    pub fn pair(initiator: &Party, responder: &Party) -> (Self, Self) {
        let session_id = Uuid::new_v4();
        let (to_responder, from_initiator) = mpsc::unbounded_channel();
        let (to_initiator, from_responder) = mpsc::unbounded_channel();

        let initiating = Self {
            session_id,
            local: initiator.clone(),
            counterparty: responder.clone(),
            outbound: to_responder,
            inbound: Mutex::new(from_responder),
        };
        let responding = Self {
            session_id,
            local: responder.clone(),
            counterparty: initiator.clone(),
            outbound: to_initiator,
            inbound: Mutex::new(from_initiator),
        };
        (initiating, responding)
    }
}

#[async_trait]
impl FlowSession for ChannelSession {
    fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn counterparty(&self) -> &Party {
        &self.counterparty
    }

    async fn send(&self, message: FlowMessage) -> FlowResult<()> {
        trace!(
            "Session {}: {} -> {}: {}",
            self.session_id,
            self.local,
            self.counterparty,
            message.kind()
        );
        let bytes = MessageEnvelope::new(self.session_id, &self.local.name, &message)?.to_bytes()?;
        self.outbound.send(bytes).map_err(|_| {
            FlowError::Communication(format!("session with {} is closed", self.counterparty))
        })
    }

    async fn receive(&self) -> FlowResult<FlowMessage> {
        let bytes = self.inbound.lock().await.recv().await.ok_or_else(|| {
            FlowError::Communication(format!("session with {} is closed", self.counterparty))
        })?;

        let envelope = MessageEnvelope::from_bytes(&bytes)?;
        if envelope.session_id != self.session_id {
            return Err(FlowError::Protocol(format!(
                "message for session {} arrived on session {}",
                envelope.session_id, self.session_id
            )));
        }
        envelope.message()
    }
}

/// A session opened by another node, delivered to the counterparty's inbox
pub struct InboundSession {
    /// The party running the initiating flow
    pub initiator: Party,
    /// The party the session was opened to
    pub recipient: Party,
    pub session: Box<dyn FlowSession>,
}

/// Delivers new sessions to node inboxes
#[derive(Default)]
pub struct SessionRouter {
    inboxes: RwLock<HashMap<String, mpsc::UnboundedSender<InboundSession>>>,
    sessions_opened: AtomicUsize,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the inbox of `node_id`
    pub fn register(&self, node_id: &str) -> mpsc::UnboundedReceiver<InboundSession> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string(), sender);
        receiver
    }

    /// Drop the inbox of `node_id`; new sessions to it fail
    pub fn disconnect(&self, node_id: &str) -> bool {
        self.inboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id)
            .is_some()
    }

    /// Number of sessions successfully opened so far
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    fn open(
        &self,
        node_id: &str,
        initiator: &Party,
        counterparty: &Party,
    ) -> FlowResult<ChannelSession> {
        let inbox = self
            .inboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
            .ok_or_else(|| FlowError::Communication(format!("node {} is unreachable", node_id)))?;

        let (ours, theirs) = ChannelSession::pair(initiator, counterparty);
        inbox
            .send(InboundSession {
                initiator: initiator.clone(),
                recipient: counterparty.clone(),
                session: Box::new(theirs),
            })
            .map_err(|_| FlowError::Communication(format!("node {} is not listening", node_id)))?;

        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Opened session {} from {} to {} on node {}",
            ours.session_id, initiator, counterparty, node_id
        );
        Ok(ours)
    }
}

/// Messaging over a [`SessionRouter`], resolving parties through a [`NetworkMap`]
pub struct InMemoryMessaging {
    router: Arc<SessionRouter>,
    map: Arc<NetworkMap>,
}

impl InMemoryMessaging {
    pub fn new(router: Arc<SessionRouter>, map: Arc<NetworkMap>) -> Self {
        Self { router, map }
    }
}

#[async_trait]
impl MessagingService for InMemoryMessaging {
    async fn open_session(
        &self,
        initiator: &Party,
        counterparty: &Party,
    ) -> FlowResult<Box<dyn FlowSession>> {
        let node_id = self.map.node_of(counterparty).ok_or_else(|| {
            FlowError::Communication(format!("no node is known to host {}", counterparty))
        })?;

        let session = self.router.open(&node_id, initiator, counterparty)?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_crypto::KeyPair;

    fn party(name: &str) -> Party {
        Party::new(name, KeyPair::generate().public_key())
    }

    #[tokio::test]
    async fn test_session_pair_delivers_in_order() {
        let (alice, bob) = ChannelSession::pair(&party("Alice"), &party("Bob"));

        alice.send(FlowMessage::Recorded).await.unwrap();
        alice
            .send(FlowMessage::Refused {
                reason: "no".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(bob.receive().await.unwrap(), FlowMessage::Recorded);
        assert_eq!(
            bob.receive().await.unwrap(),
            FlowMessage::Refused {
                reason: "no".to_string()
            }
        );
        assert_eq!(bob.counterparty().name, "Alice");
    }

    #[tokio::test]
    async fn test_closed_session_is_communication_error() {
        let (alice, bob) = ChannelSession::pair(&party("Alice"), &party("Bob"));
        drop(bob);

        assert!(matches!(
            alice.send(FlowMessage::Recorded).await,
            Err(FlowError::Communication(_))
        ));
        assert!(matches!(
            alice.receive().await,
            Err(FlowError::Communication(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_within_times_out() {
        let (alice, _bob) = ChannelSession::pair(&party("Alice"), &party("Bob"));

        let result = receive_within(&alice, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(FlowError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_router_delivers_to_inbox() {
        let router = Arc::new(SessionRouter::new());
        let map = Arc::new(NetworkMap::new());
        let alice = party("Alice");
        let bob = party("Bob");
        map.register_party(bob.clone(), "bob-node");
        let mut inbox = router.register("bob-node");

        let messaging = InMemoryMessaging::new(router.clone(), map);
        let session = messaging.open_session(&alice, &bob).await.unwrap();
        session.send(FlowMessage::Recorded).await.unwrap();

        let inbound = inbox.recv().await.unwrap();
        assert_eq!(inbound.initiator, alice);
        assert_eq!(inbound.recipient, bob);
        assert_eq!(inbound.session.receive().await.unwrap(), FlowMessage::Recorded);
        assert_eq!(router.sessions_opened(), 1);

        router.disconnect("bob-node");
        assert!(matches!(
            messaging.open_session(&alice, &bob).await,
            Err(FlowError::Communication(_))
        ));
    }
}
