//! Flow checkpoints
//!
//! The issuance flow is an explicit state machine. After every stage
//! transition its full state is written to a [`CheckpointStore`], so a flow
//! interrupted after signatures were collected can be resumed without
//! asking anyone to sign again.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs as async_fs;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use iou_ledger::{IouState, Party, SignedTransaction};

use crate::{FlowError, FlowResult};

/// Identifier of a flow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(Uuid);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowId {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| FlowError::Checkpoint(format!("invalid flow id {:?}: {}", s, e)))
    }
}

/// Where an issuance flow has got to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Building,
    SelfSigned,
    AwaitingCountersignature,
    FullySigned,
    Finalizing,
    Committed,
    Aborted { reason: String },
}

impl FlowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStage::Committed | FlowStage::Aborted { .. })
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStage::Building => write!(f, "building"),
            FlowStage::SelfSigned => write!(f, "self-signed"),
            FlowStage::AwaitingCountersignature => write!(f, "awaiting countersignature"),
            FlowStage::FullySigned => write!(f, "fully signed"),
            FlowStage::Finalizing => write!(f, "finalizing"),
            FlowStage::Committed => write!(f, "committed"),
            FlowStage::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// Persisted state of an issuance flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    pub flow_id: FlowId,
    pub stage: FlowStage,
    /// The IOU being issued
    pub proposal: IouState,
    /// Notary chosen when the transaction was built
    pub notary: Option<Party>,
    /// Signed by this node's keys only
    pub partially_signed: Option<SignedTransaction>,
    /// Signed by every participant
    pub fully_signed: Option<SignedTransaction>,
    /// Signed by every participant and the notary
    pub notarised: Option<SignedTransaction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowCheckpoint {
    pub fn new(flow_id: FlowId, proposal: IouState) -> Self {
        let now = Utc::now();
        Self {
            flow_id,
            stage: FlowStage::Building,
            proposal,
            notary: None,
            partially_signed: None,
            fully_signed: None,
            notarised: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `stage`
    pub fn advance(&mut self, stage: FlowStage) {
        debug!("Flow {}: {} -> {}", self.flow_id, self.stage, stage);
        self.stage = stage;
        self.updated_at = Utc::now();
    }
}

/// Storage for flow checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or replace the checkpoint of a flow
    async fn save(&self, checkpoint: &FlowCheckpoint) -> FlowResult<()>;

    async fn load(&self, flow_id: &FlowId) -> FlowResult<Option<FlowCheckpoint>>;

    /// All checkpoints, oldest first
    async fn list(&self) -> FlowResult<Vec<FlowCheckpoint>>;
}

/// In-memory checkpoint store
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<FlowId, FlowCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &FlowCheckpoint) -> FlowResult<()> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.flow_id, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, flow_id: &FlowId) -> FlowResult<Option<FlowCheckpoint>> {
        Ok(self.checkpoints.read().await.get(flow_id).cloned())
    }

    async fn list(&self) -> FlowResult<Vec<FlowCheckpoint>> {
        let mut all: Vec<FlowCheckpoint> = self.checkpoints.read().await.values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        Ok(all)
    }
}

/// Checkpoint store keeping one JSON file per flow
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Use `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> FlowResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            FlowError::Checkpoint(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, flow_id: &FlowId) -> PathBuf {
        self.dir.join(format!("{}.json", flow_id))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> FlowError {
    FlowError::Checkpoint(format!("{}: {}", path.display(), e))
}

fn decode(path: &Path, bytes: &[u8]) -> FlowResult<FlowCheckpoint> {
    serde_json::from_slice(bytes)
        .map_err(|e| FlowError::Checkpoint(format!("corrupt checkpoint {}: {}", path.display(), e)))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &FlowCheckpoint) -> FlowResult<()> {
        let path = self.path_for(&checkpoint.flow_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| FlowError::Serialization(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written checkpoint.
        async_fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        async_fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!("Saved checkpoint {} at stage {}", checkpoint.flow_id, checkpoint.stage);
        Ok(())
    }

    async fn load(&self, flow_id: &FlowId) -> FlowResult<Option<FlowCheckpoint>> {
        let path = self.path_for(flow_id);
        match async_fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn list(&self) -> FlowResult<Vec<FlowCheckpoint>> {
        let mut entries = async_fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let mut all = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = async_fs::read(&path).await.map_err(|e| io_error(&path, e))?;
            all.push(decode(&path, &bytes)?);
        }

        all.sort_by_key(|c| c.created_at);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iou_crypto::KeyPair;
    use iou_ledger::{Amount, Currency};
    use tempfile::tempdir;

    fn proposal() -> IouState {
        IouState::new(
            Amount::from_units(100, Currency::gbp()),
            Party::new("Alice", KeyPair::generate().public_key()),
            Party::new("Bob", KeyPair::generate().public_key()),
        )
    }

    #[tokio::test]
    async fn test_memory_store_replaces_checkpoint() {
        let store = MemoryCheckpointStore::new();
        let mut checkpoint = FlowCheckpoint::new(FlowId::new(), proposal());
        store.save(&checkpoint).await.unwrap();

        checkpoint.advance(FlowStage::SelfSigned);
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load(&checkpoint.flow_id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, FlowStage::SelfSigned);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.load(&FlowId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let mut checkpoint = FlowCheckpoint::new(FlowId::new(), proposal());
        checkpoint.advance(FlowStage::Aborted {
            reason: "refused".to_string(),
        });

        {
            let store = FileCheckpointStore::new(dir.path()).unwrap();
            store.save(&checkpoint).await.unwrap();
        }

        let reopened = FileCheckpointStore::new(dir.path()).unwrap();
        let loaded = reopened.load(&checkpoint.flow_id).await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
        assert!(loaded.stage.is_terminal());

        let all = reopened.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(reopened.load(&FlowId::new()).await.unwrap().is_none());
    }

    #[test]
    fn test_flow_id_parsing() {
        let id = FlowId::new();
        assert_eq!(id.to_string().parse::<FlowId>().unwrap(), id);
        assert!("not-a-uuid".parse::<FlowId>().is_err());
    }
}
