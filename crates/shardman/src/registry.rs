//! In-progress operation registry
//!
//! Guards against two concurrent operations on the same key. A successful
//! claim hands back a [`Claim`] that releases the key when dropped, so the
//! key is freed on every exit path of the task holding it, unwinding
//! included.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::ops::OperationRecord;

/// Keyed set of in-progress operations
#[derive(Debug, Default)]
pub struct DedupRegistry {
    in_progress: Mutex<HashMap<String, OperationRecord>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key of `op`; `None` if an operation already holds it
    pub fn claim(self: &Arc<Self>, op: &OperationRecord) -> Option<Claim> {
        let key = op.key();
        let mut in_progress = self.in_progress.lock();
        if in_progress.contains_key(&key) {
            debug!("Operation {} already in progress", key);
            return None;
        }
        in_progress.insert(key.clone(), op.clone());
        Some(Claim {
            registry: self.clone(),
            key,
        })
    }

    /// Update the registered snapshot of a claimed operation
    pub fn update(&self, op: &OperationRecord) {
        if let Some(entry) = self.in_progress.lock().get_mut(&op.key()) {
            *entry = op.clone();
        }
    }

    /// Registered snapshot of the operation holding `key`
    pub fn get(&self, key: &str) -> Option<OperationRecord> {
        self.in_progress.lock().get(key).cloned()
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.in_progress.lock().contains_key(key)
    }

    /// Snapshot of all in-progress operations
    pub fn in_progress(&self) -> Vec<OperationRecord> {
        self.in_progress.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.in_progress.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress.lock().is_empty()
    }

    fn release(&self, key: &str) -> bool {
        self.in_progress.lock().remove(key).is_some()
    }
}

/// Exclusive hold on an operation key
#[derive(Debug)]
pub struct Claim {
    registry: Arc<DedupRegistry>,
    key: String,
}

impl Claim {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.registry.release(&self.key) {
            debug!("Released operation key {}", self.key);
        }
    }
}
