//! Operation records
//!
//! One record per requested cluster operation. The record is created by the
//! submitter, mutated only by the task running it, and serialized into the
//! operation store while in flight and into the history list once finished.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Split a shard into two children
    SplitShard,
    /// Move a shard replica between nodes
    MoveShard,
}

impl OpKind {
    /// Action name used by the cluster admin API
    pub fn action(&self) -> &'static str {
        match self {
            OpKind::SplitShard => "SPLITSHARD",
            OpKind::MoveShard => "MOVESHARD",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::SplitShard => write!(f, "SplitShard"),
            OpKind::MoveShard => write!(f, "MoveShard"),
        }
    }
}

/// Requested cluster operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation kind
    pub operation: OpKind,
    /// Collection name
    pub collection: String,
    /// Shard name
    pub shard: String,
    /// Async request id issued to the cluster, empty until issued
    #[serde(default)]
    pub request_id: String,
    /// Start time (unix millis)
    pub started_ms: i64,
    /// Finish time (unix millis), unset while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_ms: Option<i64>,
    /// Failure description, empty on success
    #[serde(default)]
    pub error: String,
}

impl OperationRecord {
    pub fn new(operation: OpKind, collection: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            operation,
            collection: collection.into(),
            shard: shard.into(),
            request_id: String::new(),
            started_ms: now_millis(),
            finished_ms: None,
            error: String::new(),
        }
    }

    pub fn split(collection: impl Into<String>, shard: impl Into<String>) -> Self {
        Self::new(OpKind::SplitShard, collection, shard)
    }

    /// Dedup and store key.
    ///
    /// Kind is not part of the key: at most one operation of any kind runs
    /// per shard.
    pub fn key(&self) -> String {
        op_key(&self.collection, &self.shard)
    }

    pub fn is_finished(&self) -> bool {
        self.finished_ms.is_some()
    }

    pub fn is_successful(&self) -> bool {
        self.is_finished() && self.error.is_empty()
    }

    /// Mark finished, successful when `error` is `None`
    pub fn finish(&mut self, error: Option<String>) {
        self.error = error.unwrap_or_default();
        self.finished_ms = Some(now_millis());
    }
}

impl std::fmt::Display for OperationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{} (request {:?}, started {})",
            self.operation, self.collection, self.shard, self.request_id, self.started_ms
        )
    }
}

/// Key for an operation on `collection`/`shard`
pub fn op_key(collection: &str, shard: &str) -> String {
    format!("{}/{}", collection, shard)
}

/// Current unix time in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
