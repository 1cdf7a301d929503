//! A map of named async locks.
//!
//! Operations that the API cannot run concurrently for the same parent, such as
//! writing access list entries or creating network containers in one project,
//! take the lock for that key first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Keyed mutual exclusion.
///
/// Locks are created on first use and live as long as the map.
#[derive(Debug, Default)]
pub struct MutexKV {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MutexKV {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock on `key`. It is released when the guard is dropped.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self.get(key);
        trace!(key, "waiting for lock");
        let guard = mutex.lock_owned().await;
        trace!(key, "lock acquired");
        guard
    }

    fn get(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let kv = Arc::new(MutexKV::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let kv = Arc::clone(&kv);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = kv.lock("5f1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let kv = MutexKV::new();
        let _a = kv.lock("project-a").await;

        let b = tokio::time::timeout(Duration::from_millis(100), kv.lock("project-b")).await;
        assert!(b.is_ok());
    }

    #[test]
    fn test_waiter_wakes_on_guard_drop() {
        let kv = MutexKV::new();
        let guard = tokio_test::block_on(kv.lock("5f1"));

        let mut waiter = tokio_test::task::spawn(kv.lock("5f1"));
        tokio_test::assert_pending!(waiter.poll());

        drop(guard);
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }
}
