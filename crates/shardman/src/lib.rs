//! Shardman - shard topology operations for a sharded search cluster
//!
//! Runs long-lived shard operations against a cluster whose topology is only
//! visible through an eventually-consistent state watch.
//!
//! # Features
//! - Shard splits driven to completion from observed topology
//! - Idempotent cleanup of the retired parent shard
//! - Per-shard dedup of in-flight operations
//! - In-progress map and bounded history in an operation store
//!
//! # Usage Example
//! ```ignore
//! use shardman::{Manager, ManagerConfig};
//!
//! let manager = Manager::new(ManagerConfig::default(), watcher, admin, store);
//! let handle = manager.submit_split("logs", "shard1").await?;
//! let finished = handle.wait().await?;
//! ```

pub mod cluster;
pub mod config;
pub mod ops;
pub mod registry;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use cluster::{AdminClient, AdminError, ClusterStateWatcher, ErrorRsp, RequestStatus, WatchError};
pub use config::{ConfigError, ManagerConfig};
pub use ops::{OpKind, OperationRecord};
pub use scheduler::{Sleeper, SplitOrchestrator, TokioSleeper};
pub use storage::{FileOpStore, MemoryOpStore, OpStore, StorageError};

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

/// Manager error
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("operation {0} is already in progress")]
    AlreadyInProgress(String),
    #[error("{0} operations are not supported")]
    Unsupported(OpKind),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A submitted operation
pub struct OperationHandle {
    /// Record as submitted
    pub record: OperationRecord,
    handle: JoinHandle<OperationRecord>,
}

impl OperationHandle {
    pub fn key(&self) -> String {
        self.record.key()
    }

    /// Wait for the operation to finish
    pub async fn wait(self) -> Result<OperationRecord, JoinError> {
        self.handle.await
    }
}

/// Operation manager
///
/// Entry point for submitting and inspecting operations.
pub struct Manager {
    config: ManagerConfig,
    store: Arc<dyn OpStore>,
    orchestrator: Arc<SplitOrchestrator>,
}

impl Manager {
    /// Create a manager polling on the tokio timer
    pub fn new(
        config: ManagerConfig,
        watcher: Arc<dyn ClusterStateWatcher>,
        admin: Arc<dyn AdminClient>,
        store: Arc<dyn OpStore>,
    ) -> Self {
        Self::with_sleeper(config, watcher, admin, store, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        config: ManagerConfig,
        watcher: Arc<dyn ClusterStateWatcher>,
        admin: Arc<dyn AdminClient>,
        store: Arc<dyn OpStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let orchestrator = Arc::new(SplitOrchestrator::new(
            config.clone(),
            watcher,
            admin,
            store.clone(),
            sleeper,
        ));

        info!(
            "Manager initialized: poll_interval={}s, history_capacity={}",
            config.poll_interval_secs, config.history_capacity
        );

        Self {
            config,
            store,
            orchestrator,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<SplitOrchestrator> {
        &self.orchestrator
    }

    /// Split `shard` of `collection` in the background
    pub async fn submit_split(
        &self,
        collection: &str,
        shard: &str,
    ) -> Result<OperationHandle, ManagerError> {
        self.submit(OperationRecord::split(collection, shard)).await
    }

    /// Claim the operation's key, record it as in progress and start it.
    ///
    /// Rejected when an operation on the same shard is still running.
    pub async fn submit(&self, op: OperationRecord) -> Result<OperationHandle, ManagerError> {
        if op.operation != OpKind::SplitShard {
            return Err(ManagerError::Unsupported(op.operation));
        }

        let claim = self
            .orchestrator
            .registry()
            .claim(&op)
            .ok_or_else(|| ManagerError::AlreadyInProgress(op.key()))?;

        self.orchestrator.record_in_progress(&op).await;

        info!("submitted {}", op);
        let handle = self.orchestrator.spawn(op.clone(), claim);
        Ok(OperationHandle { record: op, handle })
    }

    /// Operations running in this process, oldest first
    pub fn in_progress(&self) -> Vec<OperationRecord> {
        let mut ops = self.orchestrator.registry().in_progress();
        ops.sort_by_key(|op| op.started_ms);
        ops
    }

    /// Up to `limit` completed operations, most recent first
    pub async fn history(&self, limit: usize) -> Result<Vec<OperationRecord>, ManagerError> {
        let entries = self.store.list(&self.config.completed_ops_key, limit).await?;
        Ok(entries
            .iter()
            .filter_map(|json| decode_record(json))
            .collect())
    }

    /// Stored in-progress operations not running in this process.
    ///
    /// These are left behind by a restart mid-operation. They are only
    /// reported; nothing resumes them.
    pub async fn stale_operations(&self) -> Result<Vec<OperationRecord>, ManagerError> {
        let registry = self.orchestrator.registry();
        let fields = self.store.fields(&self.config.op_map_key).await?;
        let mut stale: Vec<_> = fields
            .iter()
            .filter(|(key, _)| !registry.is_claimed(key))
            .filter_map(|(_, json)| decode_record(json))
            .collect();
        stale.sort_by_key(|op| op.started_ms);
        Ok(stale)
    }
}

fn decode_record(json: &str) -> Option<OperationRecord> {
    match serde_json::from_str(json) {
        Ok(op) => Some(op),
        Err(e) => {
            warn!("skipping undecodable operation record: {}", e);
            None
        }
    }
}
