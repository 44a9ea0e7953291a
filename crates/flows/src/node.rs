//! In-process nodes
//!
//! An [`InMemoryNetwork`] wires nodes, notaries, the network map and the
//! session router together. Each [`Node`] owns a listener task that answers
//! inbound sessions with an [`IouIssueResponder`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use iou_common::FlowSettings;
use iou_crypto::KeyPair;
use iou_ledger::{IouState, LedgerError, MemoryVault, Party, SignedTransaction, SimpleNotary, Vault};

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, FlowId, MemoryCheckpointStore};
use crate::directory::{LocalIdentityService, NetworkMap};
use crate::issue::IouIssueFlow;
use crate::keys::KeyStore;
use crate::messaging::{InMemoryMessaging, InboundSession, SessionRouter};
use crate::notary_client::InMemoryNotaryClient;
use crate::responder::{IouIssueResponder, ResponderStats};
use crate::{FlowContext, FlowError, FlowResult};

/// A node hosting one or more parties
pub struct Node {
    node_id: String,
    identities: Vec<Party>,
    ctx: FlowContext,
    stats: Arc<ResponderStats>,
    listener: JoinHandle<()>,
    running: Arc<Mutex<HashSet<FlowId>>>,
}

/// Marks a flow as running on its node until dropped
struct RunningFlow {
    flow_id: FlowId,
    running: Arc<Mutex<HashSet<FlowId>>>,
}

impl RunningFlow {
    fn start(running: &Arc<Mutex<HashSet<FlowId>>>, flow_id: FlowId) -> Option<Self> {
        let inserted = running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(flow_id);
        inserted.then(|| Self {
            flow_id,
            running: running.clone(),
        })
    }
}

impl Drop for RunningFlow {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.flow_id);
    }
}

impl Node {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The first party hosted here
    pub fn party(&self) -> &Party {
        &self.identities[0]
    }

    pub fn identities(&self) -> &[Party] {
        &self.identities
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    pub fn vault(&self) -> Arc<dyn Vault> {
        self.ctx.vault.clone()
    }

    pub fn stats(&self) -> &ResponderStats {
        &self.stats
    }

    /// Run an issuance of `iou`
    pub async fn issue(&self, iou: IouState) -> FlowResult<SignedTransaction> {
        let flow = IouIssueFlow::new(self.ctx.clone(), iou);
        let _running = RunningFlow::start(&self.running, flow.id());
        flow.call().await
    }

    /// Continue a flow from its checkpoint; fails if the flow is already running here
    pub async fn resume(&self, flow_id: FlowId) -> FlowResult<SignedTransaction> {
        let _running = RunningFlow::start(&self.running, flow_id).ok_or_else(|| {
            FlowError::Checkpoint(format!("flow {} is already running", flow_id))
        })?;
        IouIssueFlow::resume(self.ctx.clone(), flow_id).await
    }

    /// Resume every flow whose checkpoint is not in a terminal stage and
    /// that is not already running on this node
    pub async fn resume_pending(&self) -> FlowResult<Vec<(FlowId, FlowResult<SignedTransaction>)>> {
        let pending: Vec<FlowId> = {
            let checkpoints = self.ctx.checkpoints.list().await?;
            let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            checkpoints
                .into_iter()
                .filter(|checkpoint| !checkpoint.stage.is_terminal())
                .map(|checkpoint| checkpoint.flow_id)
                .filter(|flow_id| !running.contains(flow_id))
                .collect()
        };

        info!("Node {}: resuming {} pending flow(s)", self.node_id, pending.len());
        let mut results = Vec::with_capacity(pending.len());
        for flow_id in pending {
            results.push((flow_id, self.resume(flow_id).await));
        }
        Ok(results)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn spawn_listener(
    node_id: String,
    mut inbox: mpsc::UnboundedReceiver<InboundSession>,
    responder: IouIssueResponder,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(inbound) = inbox.recv().await {
            let responder = responder.clone();
            let node_id = node_id.clone();
            tokio::spawn(async move {
                let initiator = inbound.initiator.clone();
                if let Err(e) = responder.handle(inbound).await {
                    error!("Node {}: session with {} failed: {}", node_id, initiator, e);
                }
            });
        }
        info!("Node {}: inbox closed", node_id);
    })
}

/// A network of nodes living in one process
pub struct InMemoryNetwork {
    settings: FlowSettings,
    map: Arc<NetworkMap>,
    router: Arc<SessionRouter>,
    notary_client: Arc<InMemoryNotaryClient>,
    checkpoint_dir: Option<PathBuf>,
}

impl InMemoryNetwork {
    pub fn new(settings: FlowSettings) -> Self {
        Self {
            settings,
            map: Arc::new(NetworkMap::new()),
            router: Arc::new(SessionRouter::new()),
            notary_client: Arc::new(InMemoryNotaryClient::new()),
            checkpoint_dir: None,
        }
    }

    /// Keep each node's checkpoints under `dir/<node id>`
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn map(&self) -> &Arc<NetworkMap> {
        &self.map
    }

    pub fn create_notary(&self, name: &str) -> Arc<SimpleNotary> {
        let notary = Arc::new(SimpleNotary::new(name));
        self.map.register_notary(notary.identity().clone());
        self.notary_client.register(notary.clone());
        info!("Created notary {}", name);
        notary
    }

    /// A node hosting a single party named `name`
    pub fn create_node(&self, name: &str) -> FlowResult<Node> {
        self.create_node_with_identities(&[name])
    }

    /// A node hosting one party per name; the node is named after the first
    pub fn create_node_with_identities(&self, names: &[&str]) -> FlowResult<Node> {
        let node_id = names
            .first()
            .ok_or_else(|| {
                FlowError::Validation(LedgerError::InvalidTransaction(
                    "a node must host at least one party".to_string(),
                ))
            })?
            .to_string();

        let mut identities = Vec::with_capacity(names.len());
        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            let key = KeyPair::generate();
            let party = Party::new(*name, key.public_key());
            self.map.register_party(party.clone(), &node_id);
            identities.push(party);
            keys.push(key);
        }

        let checkpoints: Arc<dyn CheckpointStore> = match &self.checkpoint_dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir.join(&node_id))?),
            None => Arc::new(MemoryCheckpointStore::new()),
        };

        let ctx = FlowContext {
            identity: Arc::new(LocalIdentityService::new(node_id.clone(), self.map.clone())),
            keys: Arc::new(KeyStore::new(keys)),
            messaging: Arc::new(InMemoryMessaging::new(
                self.router.clone(),
                self.map.clone(),
            )),
            notary_client: self.notary_client.clone(),
            vault: Arc::new(MemoryVault::new()),
            checkpoints,
            settings: self.settings.clone(),
        };

        let stats = Arc::new(ResponderStats::default());
        let inbox = self.router.register(&node_id);
        let listener = spawn_listener(
            node_id.clone(),
            inbox,
            IouIssueResponder::new(ctx.clone(), stats.clone()),
        );

        info!("Created node {} hosting {:?}", node_id, names);
        Ok(Node {
            node_id,
            identities,
            ctx,
            stats,
            listener,
            running: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Register a party whose node never answers; the caller owns its inbox
    pub fn register_endpoint(
        &self,
        name: &str,
    ) -> (Party, mpsc::UnboundedReceiver<InboundSession>) {
        let party = Party::new(name, KeyPair::generate().public_key());
        self.map.register_party(party.clone(), name);
        (party, self.router.register(name))
    }

    /// Make `node_id` unreachable for new sessions
    pub fn disconnect(&self, node_id: &str) -> bool {
        self.router.disconnect(node_id)
    }

    pub fn sessions_opened(&self) -> usize {
        self.router.sessions_opened()
    }
}
