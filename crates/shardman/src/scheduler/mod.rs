//! Operation scheduling
//!
//! Long-running topology operations and the pieces they poll with

pub mod convergence;
mod split;

pub use convergence::{active_shard_exists, inactive_shard_exists, split_converged};
pub use split::{SplitError, SplitOrchestrator, SplitPhase};

use std::time::Duration;

use async_trait::async_trait;

/// Suspension between polls.
///
/// Production code sleeps on the tokio timer; tests substitute something
/// that does not wait on the wall clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
