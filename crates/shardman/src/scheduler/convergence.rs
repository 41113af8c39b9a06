//! Split convergence detection
//!
//! The admin API's async status is unreliable about completion, so a split
//! is judged done from the topology itself.

use sm_core::CollectionTopology;

/// Name of child `index` of a split of `shard`
pub fn child_shard_name(shard: &str, index: usize) -> String {
    format!("{}_{}", shard, index)
}

pub fn active_shard_exists(topology: &CollectionTopology, name: &str) -> bool {
    topology.shard(name).map_or(false, |s| s.is_active())
}

pub fn inactive_shard_exists(topology: &CollectionTopology, name: &str) -> bool {
    topology.shard(name).map_or(false, |s| !s.is_active())
}

/// Both children of `shard` are active and `shard` itself is present but inactive
pub fn split_converged(topology: &CollectionTopology, shard: &str) -> bool {
    active_shard_exists(topology, &child_shard_name(shard, 0))
        && active_shard_exists(topology, &child_shard_name(shard, 1))
        && inactive_shard_exists(topology, shard)
}
