//! Flow repository trait definition.
//!
//! Covers flows and their versions. The flow row is the single source of
//! truth for lifecycle state, so the compare-and-set on `operation_status`
//! lives here rather than in the service.

use serde_json::Value;

use flowplane_types::error::RepositoryError;
use flowplane_types::flow::{
    Flow, FlowId, FlowOperationStatus, FlowStatus, FlowVersion, FlowVersionId,
};

/// Repository trait for flow persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait FlowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    /// Insert a flow together with its first version in one transaction.
    fn create_flow_with_version(
        &self,
        flow: &Flow,
        version: &FlowVersion,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_flow(
        &self,
        id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Option<Flow>, RepositoryError>> + Send;

    /// List flows of a project, newest first.
    fn list_flows(
        &self,
        project_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Flow>, RepositoryError>> + Send;

    /// Move a flow to another folder. Touches no lifecycle column.
    /// `NotFound` if the row is gone.
    fn update_folder(
        &self,
        id: &FlowId,
        folder_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace a flow's free-form metadata. Touches no lifecycle column.
    /// `NotFound` if the row is gone.
    fn update_metadata(
        &self,
        id: &FlowId,
        metadata: Option<&Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically move `operation_status` from `expected` to `new`.
    ///
    /// Returns `false` (and writes nothing) when the stored value differs from
    /// `expected`. `NotFound` if the flow does not exist.
    fn claim_operation(
        &self,
        id: &FlowId,
        expected: FlowOperationStatus,
        new: FlowOperationStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Reset `operation_status` to `None`, optionally settling `status`.
    ///
    /// Returns the updated flow, or `None` if the row no longer exists.
    fn finish_operation(
        &self,
        id: &FlowId,
        status: Option<FlowStatus>,
    ) -> impl std::future::Future<Output = Result<Option<Flow>, RepositoryError>> + Send;

    /// Delete a flow and every dependent row (versions, trigger sources,
    /// flow-scoped store entries) in one transaction.
    ///
    /// Returns `false` if the flow was already gone.
    fn delete_flow_cascade(
        &self,
        id: &FlowId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    fn get_version(
        &self,
        id: &FlowVersionId,
    ) -> impl std::future::Future<Output = Result<Option<FlowVersion>, RepositoryError>> + Send;

    /// The most recently created version of a flow.
    fn get_latest_version(
        &self,
        flow_id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Option<FlowVersion>, RepositoryError>> + Send;

    /// Insert a new version, or overwrite the content of an existing draft.
    ///
    /// The stored `state` is never changed here. `Conflict` if the stored
    /// version is already locked.
    fn save_version(
        &self,
        version: &FlowVersion,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Lock a draft and point the flow's `published_version_id` at it, in one
    /// transaction. Returns the updated flow.
    fn publish_version(
        &self,
        flow_id: &FlowId,
        version_id: &FlowVersionId,
    ) -> impl std::future::Future<Output = Result<Flow, RepositoryError>> + Send;
}
