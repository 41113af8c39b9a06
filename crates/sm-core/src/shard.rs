//! Shard and collection topology snapshots
//!
//! Snapshots come from the cluster-state watch and are replaced wholesale on
//! each fetch. A `ShardState` memoizes its parsed bounds, so sharing one
//! snapshot behind an `Arc` shares the parse as well.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::bounds::{compute_bounds, Bounds, BoundsError};

/// Shard name
pub type ShardName = String;

/// Shard lifecycle state as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    /// Serving traffic
    Active,
    /// Retired, e.g. the parent of a completed split
    Inactive,
    /// Child shard still being built
    Construction,
    /// Child shard replaying updates before activation
    Recovery,
}

impl Default for ShardStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardStatus::Active => write!(f, "active"),
            ShardStatus::Inactive => write!(f, "inactive"),
            ShardStatus::Construction => write!(f, "construction"),
            ShardStatus::Recovery => write!(f, "recovery"),
        }
    }
}

/// One shard's ownership interval and liveness
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardState {
    /// Hash range, `"<low>-<high>"` in hex
    pub range: String,
    /// Shard state
    #[serde(default)]
    pub state: ShardStatus,
    #[serde(skip)]
    bounds: OnceLock<Result<Bounds, BoundsError>>,
}

impl ShardState {
    pub fn new(range: impl Into<String>, state: ShardStatus) -> Self {
        Self {
            range: range.into(),
            state,
            bounds: OnceLock::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ShardStatus::Active
    }

    /// Parsed bounds of `range`, computed on first use.
    ///
    /// Concurrent first callers may race to compute, but only one result is
    /// ever stored and every caller observes that one.
    pub fn range_bounds(&self) -> Result<Bounds, BoundsError> {
        self.bounds.get_or_init(|| compute_bounds(&self.range)).clone()
    }

    /// Share of the hash ring owned by this shard
    pub fn hash_range_share(&self) -> Result<f64, BoundsError> {
        self.range_bounds().map(|b| b.share())
    }
}

/// Immutable snapshot of a collection's shards
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionTopology {
    /// Shards keyed by name
    pub shards: HashMap<ShardName, ShardState>,
}

impl CollectionTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used when assembling a snapshot
    pub fn with_shard(mut self, name: impl Into<ShardName>, shard: ShardState) -> Self {
        self.shards.insert(name.into(), shard);
        self
    }

    pub fn shard(&self, name: &str) -> Option<&ShardState> {
        self.shards.get(name)
    }

    pub fn contains_shard(&self, name: &str) -> bool {
        self.shards.contains_key(name)
    }

    /// Hash ring share of every active shard.
    ///
    /// Shards with unparseable ranges report zero.
    pub fn hash_shares(&self) -> BTreeMap<ShardName, f64> {
        self.shards
            .iter()
            .filter(|(_, shard)| shard.is_active())
            .map(|(name, shard)| (name.clone(), shard.hash_range_share().unwrap_or(0.0)))
            .collect()
    }
}
