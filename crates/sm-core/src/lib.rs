//! Core shard range and topology types
//!
//! Provides the pieces shared by everything that reasons about shard layout:
//! - Parsing a shard's hash range into signed ring bounds
//! - Hash ring share of a range
//! - Collection topology snapshots with memoized shard bounds

pub mod bounds;
pub mod shard;

// Re-export commonly used types
pub use bounds::{compute_bounds, hash_range_share, Bounds, BoundsError, HASH_RING_SIZE};
pub use shard::{CollectionTopology, ShardName, ShardState, ShardStatus};
