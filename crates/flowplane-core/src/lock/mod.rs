//! Lock service port.
//!
//! Locks are keyed by string and acquired with a bounded wait. The returned
//! guard releases the lock when dropped, so every exit path releases it.

pub mod memory;

use std::any::Any;
use std::time::Duration;

use flowplane_types::error::LockError;

pub use memory::InMemoryLockService;

pub trait LockService: Send + Sync {
    /// Wait up to `timeout` for the lock on `key`.
    fn acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<LockGuard, LockError>> + Send;
}

/// A held lock. Dropping the guard releases it.
pub struct LockGuard {
    key: String,
    _held: Box<dyn Any + Send + Sync>,
}

impl LockGuard {
    /// Wrap whatever value keeps the backend lock held.
    pub fn new(key: impl Into<String>, held: impl Any + Send + Sync) -> Self {
        Self {
            key: key.into(),
            _held: Box::new(held),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock now.
    pub fn release(self) {
        tracing::debug!(key = %self.key, "lock released");
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}
