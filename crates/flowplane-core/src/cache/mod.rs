//! Cache port and the flow execution cache built on it.

pub mod execution;
pub mod memory;

use std::time::Duration;

use flowplane_types::error::CacheError;

pub use execution::ExecutionCache;
pub use memory::InMemoryCache;

/// Key/value cache with per-entry TTL.
pub trait CacheBackend: Send + Sync {
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>, CacheError>> + Send;

    fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    fn delete(&self, key: &str) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;
}
