// src/intake/locks.rs
// Per-session mutual exclusion: one turn (or report run) per session at a time

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Serializes work on the same session. Prevents double-counted answers and
/// duplicate report handoffs when two turns for one session race.
#[derive(Default)]
pub struct SessionLocks {
    locks: RwLock<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the lock for a session
    pub async fn get_lock(&self, session_id: i64) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&session_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access; released when the guard drops
    pub async fn acquire(&self, session_id: i64) -> OwnedMutexGuard<()> {
        self.get_lock(session_id).await.lock_owned().await
    }

    /// Forget a session's lock once nobody holds or waits on it.
    /// Guards and waiters keep their own `Arc`, so a busy lock is never removed.
    pub async fn release(&self, session_id: i64) {
        let mut locks = self.locks.write().await;
        if locks
            .get(&session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&session_id);
        }
    }

    /// Drop every lock nobody holds or waits on
    pub async fn prune(&self) {
        let mut locks = self.locks.write().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_same_lock() {
        let locks = SessionLocks::new();
        let a = locks.get_lock(1).await;
        let b = locks.get_lock(1).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &locks.get_lock(2).await));
    }

    #[tokio::test]
    async fn test_acquire_serializes() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire(9).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(9).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_only_idle_locks() {
        let locks = SessionLocks::new();
        drop(locks.acquire(1).await);
        locks.release(1).await;
        assert_eq!(locks.len().await, 0);

        let held = locks.acquire(2).await;
        locks.release(2).await;
        assert_eq!(locks.len().await, 1);

        drop(held);
        locks.release(2).await;
        assert_eq!(locks.len().await, 0);

        // Unknown session is a no-op
        locks.release(3).await;
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = SessionLocks::new();
        let _held = locks.acquire(1).await;
        drop(locks.acquire(2).await);

        locks.prune().await;
        assert_eq!(locks.len().await, 1);
    }
}
