//! Per-instance mutual exclusion.
//!
//! Writers of one instance queue on that instance's mutex; writers of
//! different instances never touch the same lock. The registry map itself is
//! guarded by a std mutex held only long enough to clone an `Arc`.

use pathwise_core::InstanceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Registry size above which idle entries are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Lazily created async locks keyed by instance.
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<InstanceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstanceLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an instance.
    pub async fn acquire(&self, id: InstanceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                // only the map holds these, so nobody is waiting on them
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry for a deleted instance.
    pub fn forget(&self, id: InstanceId) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(&id);
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// True if no instance is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_instance_is_exclusive() {
        let locks = InstanceLocks::new();
        let id = InstanceId::new();

        let guard = locks.acquire(id).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(id)).await;
        assert!(second.is_err(), "second acquire should wait");

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(id)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_instances_do_not_contend() {
        let locks = InstanceLocks::new();
        let _a = locks.acquire(InstanceId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(InstanceId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_forget_removes_entry() {
        let locks = InstanceLocks::new();
        let id = InstanceId::new();
        drop(locks.acquire(id).await);
        locks.forget(id);
        assert!(locks.is_empty());
    }
}
