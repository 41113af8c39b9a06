//! Shard split orchestration
//!
//! Drives one split to completion:
//! 1. Validating - the collection and shard must exist
//! 2. CommandIssued - async split issued under a fresh request id
//! 3. Polling - request status checked for failures, topology checked for convergence
//! 4. Finalizing - the retired parent shard is deleted
//!
//! Whatever the outcome, including a panic, the operation is removed from the
//! in-progress map and appended to the completed history, and only then is the
//! operation key released.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::convergence::{child_shard_name, split_converged};
use super::Sleeper;
use crate::cluster::{AdminClient, AdminError, ClusterStateWatcher, RequestStatus, WatchError};
use crate::config::ManagerConfig;
use crate::ops::{OpKind, OperationRecord};
use crate::registry::{Claim, DedupRegistry};
use crate::storage::OpStore;

/// Terminal split failure
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("{0}")]
    NotFound(String),
    #[error("{context}: {source}")]
    Command {
        context: String,
        #[source]
        source: AdminError,
    },
    #[error("async {action} failed: {message}")]
    RemoteFailure {
        action: &'static str,
        message: String,
    },
    #[error("failed to read cluster state: {0}")]
    ClusterState(#[from] WatchError),
    #[error("operation task aborted: {0}")]
    Aborted(String),
}

/// Split phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPhase {
    Validating,
    CommandIssued,
    Polling,
    Finalizing,
}

impl std::fmt::Display for SplitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitPhase::Validating => write!(f, "validating"),
            SplitPhase::CommandIssued => write!(f, "command_issued"),
            SplitPhase::Polling => write!(f, "polling"),
            SplitPhase::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// Split orchestrator
pub struct SplitOrchestrator {
    config: ManagerConfig,
    watcher: Arc<dyn ClusterStateWatcher>,
    admin: Arc<dyn AdminClient>,
    store: Arc<dyn OpStore>,
    sleeper: Arc<dyn Sleeper>,
    /// Operations currently running through this orchestrator
    registry: Arc<DedupRegistry>,
}

impl SplitOrchestrator {
    pub fn new(
        config: ManagerConfig,
        watcher: Arc<dyn ClusterStateWatcher>,
        admin: Arc<dyn AdminClient>,
        store: Arc<dyn OpStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            watcher,
            admin,
            store,
            sleeper,
            registry: Arc::new(DedupRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<DedupRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Run `op` on a background task
    pub fn spawn(self: &Arc<Self>, op: OperationRecord, claim: Claim) -> JoinHandle<OperationRecord> {
        tokio::spawn(self.clone().run(op, claim))
    }

    /// Run `op` to completion and record the outcome.
    ///
    /// Never fails: errors end up in the returned record's `error`. The split
    /// itself runs on its own task so a panic below it is still recorded.
    pub async fn run(self: Arc<Self>, op: OperationRecord, claim: Claim) -> OperationRecord {
        let key = op.key();
        let worker = self.clone();
        let mut attempt = op.clone();
        let joined = tokio::spawn(async move {
            let result = worker.split(&mut attempt).await;
            (attempt, result)
        })
        .await;

        let (mut op, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // Last snapshot carries the request id, if one was issued
                let op = self.registry.get(&key).unwrap_or(op);
                (op, Err(SplitError::Aborted(e.to_string())))
            }
        };

        match result {
            Ok(()) => {
                op.finish(None);
                info!("completed {} request: {}", op.operation, op);
            }
            Err(err) => {
                let message = format!("failed {} request: {} with err: {}", op.operation, op, err);
                error!("{}", message);
                op.finish(Some(message));
            }
        }

        self.finalize(&op, claim).await;
        op
    }

    /// Write `op` to the in-progress map; best-effort
    pub async fn record_in_progress(&self, op: &OperationRecord) {
        let key = op.key();
        match serde_json::to_string(op) {
            Ok(json) => {
                if let Err(e) = self.store.put_field(&self.config.op_map_key, &key, json).await {
                    warn!("failed to record operation {} in {}: {}", key, self.config.op_map_key, e);
                }
            }
            Err(e) => warn!("failed to serialize operation {}: {}", key, e),
        }
    }

    async fn split(&self, op: &mut OperationRecord) -> Result<(), SplitError> {
        let action = OpKind::SplitShard.action();
        info!("splitting shard {:?} of collection {:?}", op.shard, op.collection);

        // Fail if we can't retrieve the initial state
        self.enter(op, SplitPhase::Validating);
        let topology = self
            .watcher
            .collection_topology(&op.collection)
            .await
            .map_err(|e| {
                SplitError::NotFound(format!("failed to fetch collection {}: {}", op.collection, e))
            })?
            .ok_or_else(|| {
                SplitError::NotFound(format!(
                    "no such collection {} (maybe it disappeared?)",
                    op.collection
                ))
            })?;

        let parent = topology.shard(&op.shard).ok_or_else(|| {
            SplitError::NotFound(format!(
                "no such shard {} in collection {}",
                op.shard, op.collection
            ))
        })?;
        match parent.range_bounds() {
            Ok(bounds) => debug!(
                "shard {} owns {} ({:.4} of hash ring)",
                op.shard,
                bounds,
                bounds.share()
            ),
            Err(e) => warn!("shard {} has unparseable range: {}", op.shard, e),
        }

        let request_id = Uuid::new_v4().to_string();
        op.request_id = request_id.clone();
        self.registry.update(op);
        self.record_in_progress(op).await;
        self.admin
            .split_shard(&op.collection, &op.shard, &request_id)
            .await
            .map_err(|source| SplitError::Command {
                context: format!("failed to issue {} command", action),
                source,
            })?;
        self.enter(op, SplitPhase::CommandIssued);
        debug!("async {} command issued successfully (requestid = {:?})", action, request_id);

        self.enter(op, SplitPhase::Polling);
        loop {
            // Request status only tells us about failures
            let status = self
                .check_request_status(action, &request_id)
                .await
                .map_err(|source| SplitError::Command {
                    context: format!("failed to get status of request {:?}", request_id),
                    source,
                })?;
            if let Some(message) = status.error.filter(|m| !m.is_empty()) {
                return Err(SplitError::RemoteFailure { action, message });
            }

            let topology = self
                .watcher
                .collection_topology(&op.collection)
                .await?
                .ok_or_else(|| {
                    SplitError::NotFound(format!(
                        "collection {} disappeared during split",
                        op.collection
                    ))
                })?;

            if split_converged(&topology, &op.shard) {
                debug!(
                    "shards {} and {} exist and are active, and shard {} is inactive - assuming {} has completed",
                    child_shard_name(&op.shard, 0),
                    child_shard_name(&op.shard, 1),
                    op.shard,
                    action
                );
                break;
            }

            self.sleeper.sleep(self.config.poll_interval()).await;
        }

        self.enter(op, SplitPhase::Finalizing);
        match self.admin.delete_shard(&op.collection, &op.shard).await {
            Ok(()) => {
                info!("deleted shard {:?} of collection {:?}", op.shard, op.collection);
            }
            // A prior attempt already deleted it, e.g. its call timed out after the
            // cluster acted on it
            Err(err) if err.no_such_shard(&op.collection, &op.shard).is_some() => {
                debug!("assuming shard was previously deleted: {}", err.root());
            }
            Err(source) => {
                return Err(SplitError::Command {
                    context: "failed to issue DELETESHARD command".to_string(),
                    source,
                });
            }
        }

        Ok(())
    }

    async fn check_request_status(
        &self,
        action: &str,
        request_id: &str,
    ) -> Result<RequestStatus, AdminError> {
        let status = self.admin.request_status(action, request_id).await?;
        debug!(
            "{} request {:?}: done={}, error={:?}",
            action, request_id, status.done, status.error
        );
        Ok(status)
    }

    /// Record the outcome and release the key; each store step is best-effort
    async fn finalize(&self, op: &OperationRecord, claim: Claim) {
        let key = op.key();
        if let Err(e) = self.store.delete_field(&self.config.op_map_key, &key).await {
            warn!("failed to remove operation {} from {}: {}", key, self.config.op_map_key, e);
        }

        match serde_json::to_string(op) {
            Ok(json) => {
                if let Err(e) = self.store.push_front(&self.config.completed_ops_key, json).await {
                    warn!("failed to record completed operation {}: {}", key, e);
                }
            }
            Err(e) => warn!("failed to serialize completed operation {}: {}", key, e),
        }

        if let Err(e) = self
            .store
            .trim(&self.config.completed_ops_key, self.config.history_capacity)
            .await
        {
            warn!("failed to trim {}: {}", self.config.completed_ops_key, e);
        }

        // Released last: a resubmission must not see our op-map entry go away
        drop(claim);
    }

    fn enter(&self, op: &OperationRecord, phase: SplitPhase) {
        debug!("operation {} entering {}", op.key(), phase);
    }
}
