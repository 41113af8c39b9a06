//! Cluster collaborators
//!
//! Interfaces to the cluster-state watch and the cluster admin API. Both are
//! supplied by the embedding service; nothing in this crate speaks the wire
//! protocol.

use std::sync::Arc;

use async_trait::async_trait;
use sm_core::CollectionTopology;

/// HTTP-style status code the admin API uses for client errors
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Structured error response from the admin API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRsp {
    /// Response status code
    pub code: u16,
    /// Response message
    pub msg: String,
}

impl std::fmt::Display for ErrorRsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}: {}", self.code, self.msg)
    }
}

/// Admin API error
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdminError {
    #[error("admin API error, {0}")]
    Response(ErrorRsp),
    #[error("admin API transport error: {0}")]
    Transport(String),
    #[error("{context}: {source}")]
    Chained {
        context: String,
        #[source]
        source: Box<AdminError>,
    },
}

impl AdminError {
    pub fn response(code: u16, msg: impl Into<String>) -> Self {
        AdminError::Response(ErrorRsp {
            code,
            msg: msg.into(),
        })
    }

    /// Wrap with additional context
    pub fn chain(self, context: impl Into<String>) -> Self {
        AdminError::Chained {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error of a chain
    pub fn root(&self) -> &AdminError {
        match self {
            AdminError::Chained { source, .. } => source.root(),
            other => other,
        }
    }

    /// Match the "no such shard" response for exactly this collection/shard.
    ///
    /// Returns the matching response so callers can log it.
    pub fn no_such_shard(&self, collection: &str, shard: &str) -> Option<&ErrorRsp> {
        match self.root() {
            AdminError::Response(rsp) if rsp.code == STATUS_BAD_REQUEST => {
                let pattern = format!(
                    "No shard with name {} exists for collection {}",
                    shard, collection
                );
                rsp.msg.contains(&pattern).then_some(rsp)
            }
            _ => None,
        }
    }
}

/// Status of an async admin request.
///
/// `done` is not trusted for completion; only `error` is acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStatus {
    pub done: bool,
    pub error: Option<String>,
}

/// Cluster-state watch error
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    #[error("cluster state unavailable: {0}")]
    Unavailable(String),
    #[error("failed to decode state for collection {collection}: {reason}")]
    Decode { collection: String, reason: String },
}

/// Source of collection topology snapshots
#[async_trait]
pub trait ClusterStateWatcher: Send + Sync {
    /// Latest known topology of `collection`.
    ///
    /// `Ok(None)` means the watch has no such collection; `Err` means the
    /// lookup itself failed.
    async fn collection_topology(
        &self,
        collection: &str,
    ) -> Result<Option<Arc<CollectionTopology>>, WatchError>;
}

/// Async command API of the cluster
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Start an async split of `shard`, tagged with `request_id`
    async fn split_shard(
        &self,
        collection: &str,
        shard: &str,
        request_id: &str,
    ) -> Result<(), AdminError>;

    /// Delete `shard` from `collection`
    async fn delete_shard(&self, collection: &str, shard: &str) -> Result<(), AdminError>;

    /// Status of the async request `request_id` of kind `action`
    async fn request_status(
        &self,
        action: &str,
        request_id: &str,
    ) -> Result<RequestStatus, AdminError>;
}
