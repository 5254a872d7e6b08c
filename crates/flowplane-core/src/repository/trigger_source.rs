//! Trigger source repository trait definition.

use flowplane_types::error::RepositoryError;
use flowplane_types::flow::FlowId;
use flowplane_types::trigger::TriggerSource;
use uuid::Uuid;

/// Storage for trigger registrations.
///
/// Rows are soft-deleted; every read filters on `deleted_at IS NULL`.
pub trait TriggerSourceRepository: Send + Sync {
    /// The active registration for `(flow_id, simulate)`, if any.
    fn get_active(
        &self,
        flow_id: &FlowId,
        simulate: bool,
    ) -> impl std::future::Future<Output = Result<Option<TriggerSource>, RepositoryError>> + Send;

    /// Soft-delete any active row for the source's `(flow_id, simulate)` and
    /// insert `source`, in one transaction.
    fn replace_active(
        &self,
        source: &TriggerSource,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a row deleted. No-op if already deleted.
    fn soft_delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All active production polling registrations.
    fn list_active_polling(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<TriggerSource>, RepositoryError>> + Send;
}
