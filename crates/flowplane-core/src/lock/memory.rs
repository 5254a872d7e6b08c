//! In-memory lock service backed by per-key async mutexes.
//!
//! Single-process only: locks are not visible across process boundaries.
//! A key's entry lives only while someone holds or waits for it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use flowplane_types::error::LockError;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LockGuard, LockService};

type LockMap = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Drop the entry for `key` unless another acquirer still references it.
fn forget_if_idle(locks: &LockMap, key: &str) {
    locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
}

/// Keeps the mutex held and prunes the map entry on release.
struct HeldLock {
    key: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        forget_if_idle(&self.locks, &self.key);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLockService {
    locks: LockMap,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of keys currently held or awaited.
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

impl LockService for InMemoryLockService {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let mutex = self.mutex_for(key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(key, "lock acquired");
                let held = HeldLock {
                    key: key.to_string(),
                    locks: Arc::clone(&self.locks),
                    guard: Some(guard),
                };
                Ok(LockGuard::new(key, held))
            }
            Err(_) => {
                forget_if_idle(&self.locks, key);
                Err(LockError::Timeout {
                    key: key.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
