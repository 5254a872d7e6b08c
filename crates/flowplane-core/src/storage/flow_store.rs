//! Flow-scoped key-value store trait.
//!
//! Holds small per-flow state such as polling cursors and captured trigger
//! samples. Entries are removed together with their flow.

use flowplane_types::error::RepositoryError;
use flowplane_types::flow::FlowId;

/// Trait for flow-scoped key-value persistent storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in flowplane-infra.
pub trait FlowStore: Send + Sync {
    /// Get a value by key. Returns None if the key does not exist.
    fn get(
        &self,
        flow_id: &FlowId,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>, RepositoryError>> + Send;

    /// Set a value for a key (upsert).
    fn put(
        &self,
        flow_id: &FlowId,
        key: &str,
        value: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key. No-op if key does not exist.
    fn delete(
        &self,
        flow_id: &FlowId,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Key under which the sample payload captured by a test trigger is stored.
pub const SAMPLE_DATA_KEY: &str = "trigger/sample_data";
