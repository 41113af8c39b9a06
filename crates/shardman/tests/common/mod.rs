// Shared fakes for orchestrator tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::Level;

use shardman::cluster::STATUS_BAD_REQUEST;
use shardman::{
    AdminClient, AdminError, ClusterStateWatcher, Manager, ManagerConfig, MemoryOpStore, OpStore,
    RequestStatus, Sleeper, StorageError, WatchError,
};
use sm_core::{CollectionTopology, ShardState, ShardStatus};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

/// How the fake answers DELETESHARD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    Succeed,
    /// Already gone, for exactly the requested collection/shard
    NoSuchShard,
    /// "Already gone" for some other shard
    NoSuchOtherShard,
    Fail,
    /// Admin client bug: the call panics
    Panic,
}

struct FakeState {
    collections: HashMap<String, Arc<CollectionTopology>>,
    /// Status polls after which an issued split shows up in the topology
    converge_after: Option<usize>,
    status_polls: usize,
    pending_split: Option<(String, String)>,
    split_error: Option<AdminError>,
    status_error: Option<AdminError>,
    remote_failure: Option<String>,
    watch_error_after_split: bool,
    delete: DeleteBehavior,
    split_calls: Vec<(String, String, String)>,
    delete_calls: Vec<(String, String)>,
}

/// In-memory cluster acting as both state watch and admin API
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                collections: HashMap::new(),
                converge_after: Some(1),
                status_polls: 0,
                pending_split: None,
                split_error: None,
                status_error: None,
                remote_failure: None,
                watch_error_after_split: false,
                delete: DeleteBehavior::Succeed,
                split_calls: Vec::new(),
                delete_calls: Vec::new(),
            }),
        }
    }

    /// Cluster with one collection of `shards`, each active and owning a slice of the ring
    pub fn with_shards(collection: &str, shards: &[&str]) -> Self {
        let cluster = Self::new();
        let topology = shards.iter().fold(CollectionTopology::new(), |t, name| {
            t.with_shard(*name, ShardState::new("80000000-7fffffff", ShardStatus::Active))
        });
        cluster.set_topology(collection, topology);
        cluster
    }

    pub fn set_topology(&self, collection: &str, topology: CollectionTopology) {
        self.state
            .lock()
            .collections
            .insert(collection.to_string(), Arc::new(topology));
    }

    pub fn topology(&self, collection: &str) -> Option<Arc<CollectionTopology>> {
        self.state.lock().collections.get(collection).cloned()
    }

    pub fn set_converge_after(&self, polls: Option<usize>) {
        self.state.lock().converge_after = polls;
    }

    pub fn set_split_error(&self, err: AdminError) {
        self.state.lock().split_error = Some(err);
    }

    pub fn set_status_error(&self, err: AdminError) {
        self.state.lock().status_error = Some(err);
    }

    pub fn set_remote_failure(&self, message: &str) {
        self.state.lock().remote_failure = Some(message.to_string());
    }

    pub fn set_watch_error_after_split(&self) {
        self.state.lock().watch_error_after_split = true;
    }

    pub fn set_delete_behavior(&self, behavior: DeleteBehavior) {
        self.state.lock().delete = behavior;
    }

    pub fn status_polls(&self) -> usize {
        self.state.lock().status_polls
    }

    pub fn split_calls(&self) -> Vec<(String, String, String)> {
        self.state.lock().split_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<(String, String)> {
        self.state.lock().delete_calls.clone()
    }

    /// Make the issued split visible: parent inactive, two active children
    pub fn converge_now(&self) {
        let mut state = self.state.lock();
        if let Some((collection, shard)) = state.pending_split.take() {
            apply_split(&mut state, &collection, &shard);
        }
    }
}

fn apply_split(state: &mut FakeState, collection: &str, shard: &str) {
    let Some(current) = state.collections.get(collection) else {
        return;
    };
    let mut next = CollectionTopology::clone(current);
    if let Some(parent) = next.shards.get_mut(shard) {
        let bounds = parent.range_bounds().expect("fake shard ranges are valid");
        *parent = ShardState::new(parent.range.clone(), ShardStatus::Inactive);
        if let Some((lower, upper)) = bounds.halves() {
            next.shards.insert(
                format!("{}_0", shard),
                ShardState::new(lower.to_range_string(), ShardStatus::Active),
            );
            next.shards.insert(
                format!("{}_1", shard),
                ShardState::new(upper.to_range_string(), ShardStatus::Active),
            );
        }
    }
    state.collections.insert(collection.to_string(), Arc::new(next));
}

#[async_trait]
impl ClusterStateWatcher for FakeCluster {
    async fn collection_topology(
        &self,
        collection: &str,
    ) -> Result<Option<Arc<CollectionTopology>>, WatchError> {
        let state = self.state.lock();
        if state.watch_error_after_split && !state.split_calls.is_empty() {
            return Err(WatchError::Unavailable("watch session expired".to_string()));
        }
        Ok(state.collections.get(collection).cloned())
    }
}

#[async_trait]
impl AdminClient for FakeCluster {
    async fn split_shard(
        &self,
        collection: &str,
        shard: &str,
        request_id: &str,
    ) -> Result<(), AdminError> {
        let mut state = self.state.lock();
        state.split_calls.push((
            collection.to_string(),
            shard.to_string(),
            request_id.to_string(),
        ));
        if let Some(err) = state.split_error.clone() {
            return Err(err);
        }
        state.status_polls = 0;
        state.pending_split = Some((collection.to_string(), shard.to_string()));
        Ok(())
    }

    async fn delete_shard(&self, collection: &str, shard: &str) -> Result<(), AdminError> {
        let mut state = self.state.lock();
        if state.delete == DeleteBehavior::Panic {
            drop(state);
            panic!("admin client crashed deleting {}/{}", collection, shard);
        }
        state
            .delete_calls
            .push((collection.to_string(), shard.to_string()));
        match state.delete {
            DeleteBehavior::Succeed => {
                if let Some(current) = state.collections.get(collection) {
                    let mut next = CollectionTopology::clone(current);
                    next.shards.remove(shard);
                    state.collections.insert(collection.to_string(), Arc::new(next));
                }
                Ok(())
            }
            DeleteBehavior::NoSuchShard => Err(no_such_shard(collection, shard)),
            DeleteBehavior::NoSuchOtherShard => Err(no_such_shard(collection, "shard99")),
            DeleteBehavior::Fail => Err(AdminError::response(500, "Server Error")
                .chain("DELETESHARD request failed")),
            DeleteBehavior::Panic => unreachable!(),
        }
    }

    async fn request_status(
        &self,
        _action: &str,
        _request_id: &str,
    ) -> Result<RequestStatus, AdminError> {
        let mut state = self.state.lock();
        state.status_polls += 1;
        if let Some(err) = state.status_error.clone() {
            return Err(err);
        }
        if let Some(message) = state.remote_failure.clone() {
            return Ok(RequestStatus {
                done: true,
                error: Some(message),
            });
        }
        if let Some(after) = state.converge_after {
            if state.status_polls >= after {
                if let Some((collection, shard)) = state.pending_split.take() {
                    apply_split(&mut state, &collection, &shard);
                }
            }
        }
        // Never reports done; completion is judged from topology
        Ok(RequestStatus {
            done: false,
            error: None,
        })
    }
}

fn no_such_shard(collection: &str, shard: &str) -> AdminError {
    AdminError::response(
        STATUS_BAD_REQUEST,
        format!(
            "org.apache.solr.common.SolrException: No shard with name {} exists for collection {}",
            shard, collection
        ),
    )
    .chain("DELETESHARD request failed")
}

/// Counts sleeps without waiting
#[derive(Default)]
pub struct CountingSleeper {
    sleeps: AtomicUsize,
    last: Mutex<Option<Duration>>,
}

impl CountingSleeper {
    pub fn count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<Duration> {
        *self.last.lock()
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(duration);
        tokio::task::yield_now().await;
    }
}

/// Blocks each sleep until a permit is released
pub struct GatedSleeper {
    gate: Semaphore,
    waiting: AtomicUsize,
}

impl GatedSleeper {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Wait until some task is parked in `sleep`
    pub async fn wait_for_sleeper(&self) {
        while self.waiting() == 0 {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Sleeper for GatedSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store whose every call fails
pub struct FailingStore;

#[async_trait]
impl OpStore for FailingStore {
    async fn put_field(&self, _map: &str, _field: &str, _value: String) -> Result<(), StorageError> {
        Err(unavailable())
    }

    async fn delete_field(&self, _map: &str, _field: &str) -> Result<(), StorageError> {
        Err(unavailable())
    }

    async fn fields(&self, _map: &str) -> Result<HashMap<String, String>, StorageError> {
        Err(unavailable())
    }

    async fn push_front(&self, _list: &str, _value: String) -> Result<(), StorageError> {
        Err(unavailable())
    }

    async fn trim(&self, _list: &str, _len: usize) -> Result<(), StorageError> {
        Err(unavailable())
    }

    async fn list(&self, _list: &str, _limit: usize) -> Result<Vec<String>, StorageError> {
        Err(unavailable())
    }
}

/// Memory store whose field deletes take `delay`
pub struct SlowDeleteStore {
    inner: MemoryOpStore,
    delay: Duration,
}

impl SlowDeleteStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryOpStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl OpStore for SlowDeleteStore {
    async fn put_field(&self, map: &str, field: &str, value: String) -> Result<(), StorageError> {
        self.inner.put_field(map, field, value).await
    }

    async fn delete_field(&self, map: &str, field: &str) -> Result<(), StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_field(map, field).await
    }

    async fn fields(&self, map: &str) -> Result<HashMap<String, String>, StorageError> {
        self.inner.fields(map).await
    }

    async fn push_front(&self, list: &str, value: String) -> Result<(), StorageError> {
        self.inner.push_front(list, value).await
    }

    async fn trim(&self, list: &str, len: usize) -> Result<(), StorageError> {
        self.inner.trim(list, len).await
    }

    async fn list(&self, list: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        self.inner.list(list, limit).await
    }
}

fn unavailable() -> StorageError {
    StorageError::Unavailable("connection refused".to_string())
}

pub fn manager(
    cluster: Arc<FakeCluster>,
    store: Arc<dyn OpStore>,
    sleeper: Arc<dyn Sleeper>,
) -> Manager {
    init_tracing();
    Manager::with_sleeper(
        ManagerConfig::default(),
        cluster.clone(),
        cluster,
        store,
        sleeper,
    )
}
