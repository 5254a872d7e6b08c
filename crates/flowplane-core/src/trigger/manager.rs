//! Trigger source manager.
//!
//! Activates and deactivates a flow's trigger registration with the engine
//! and keeps the `trigger_sources` table in step with it. Production and
//! simulate registrations are tracked independently; each has at most one
//! active row per flow.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use flowplane_types::flow::{FlowId, FlowVersion};
use flowplane_types::trigger::{PieceTriggerDefinition, TriggerSource};

use crate::engine::BoxTriggerEngine;
use crate::repository::trigger_source::TriggerSourceRepository;
use crate::storage::FlowStore;

use super::TriggerError;
use super::polling::cursor_key;

pub struct TriggerSourceManager<S: TriggerSourceRepository, K: FlowStore> {
    sources: Arc<S>,
    store: Arc<K>,
    engine: Arc<BoxTriggerEngine>,
}

impl<S: TriggerSourceRepository, K: FlowStore> TriggerSourceManager<S, K> {
    pub fn new(sources: Arc<S>, store: Arc<K>, engine: Arc<BoxTriggerEngine>) -> Self {
        Self {
            sources,
            store,
            engine,
        }
    }

    pub fn engine(&self) -> &BoxTriggerEngine {
        &self.engine
    }

    /// Resolve the piece trigger behind a version.
    pub async fn resolve(&self, version: &FlowVersion) -> Result<PieceTriggerDefinition, TriggerError> {
        Ok(self.engine.resolve_trigger(version).await?)
    }

    /// Register a version's trigger and record it as the active source for
    /// `(flow, simulate)`, replacing any previous row.
    ///
    /// An engine failure leaves the table untouched. If the engine accepted
    /// the registration but the row cannot be written, the registration is
    /// withdrawn again on a best-effort basis before the error is returned.
    pub async fn enable(
        &self,
        version: &FlowVersion,
        project_id: &str,
        simulate: bool,
    ) -> Result<TriggerSource, TriggerError> {
        let definition = self.engine.resolve_trigger(version).await?;
        let registration = self.engine.register(version, project_id, simulate).await?;

        let source = TriggerSource {
            id: Uuid::now_v7(),
            flow_id: version.flow_id,
            flow_version_id: version.id,
            project_id: project_id.to_string(),
            simulate,
            trigger_type: registration.trigger_type,
            piece_name: definition.piece_name,
            trigger_name: definition.trigger_name,
            schedule: registration.schedule,
            handshake: registration.handshake.or(definition.handshake),
            created_at: Utc::now(),
            deleted_at: None,
        };

        if let Err(e) = self.sources.replace_active(&source).await {
            tracing::warn!(
                flow_id = %source.flow_id,
                simulate,
                error = %e,
                "failed to record trigger source, withdrawing registration"
            );
            if let Err(unregister_err) = self.engine.unregister(&source).await {
                tracing::error!(
                    flow_id = %source.flow_id,
                    error = %unregister_err,
                    "orphaned trigger registration could not be withdrawn"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            flow_id = %source.flow_id,
            version_id = %source.flow_version_id,
            trigger_type = %source.trigger_type,
            simulate,
            "trigger source enabled"
        );
        Ok(source)
    }

    /// Withdraw the active registration for `(flow, simulate)`, if any.
    ///
    /// With `ignore_error` the engine error is logged and the row is
    /// soft-deleted anyway. Without it the error propagates and the row stays
    /// active so a retry unregisters again. Returns the source that was
    /// disabled.
    pub async fn disable(
        &self,
        flow_id: &FlowId,
        project_id: &str,
        simulate: bool,
        ignore_error: bool,
    ) -> Result<Option<TriggerSource>, TriggerError> {
        let Some(source) = self.sources.get_active(flow_id, simulate).await? else {
            return Ok(None);
        };

        if let Err(e) = self.engine.unregister(&source).await {
            if !ignore_error {
                return Err(e.into());
            }
            tracing::warn!(%flow_id, project_id, simulate, error = %e, "ignoring unregister failure");
        }

        self.sources.soft_delete(&source.id).await?;

        if !simulate && source.is_polling() {
            let key = cursor_key(&source.trigger_name);
            if let Err(e) = self.store.delete(flow_id, &key).await {
                tracing::warn!(%flow_id, error = %e, "failed to clear polling cursor");
            }
        }

        tracing::info!(%flow_id, project_id, simulate, "trigger source disabled");
        Ok(Some(source))
    }

    pub async fn get_by_flow_id(
        &self,
        flow_id: &FlowId,
        simulate: bool,
    ) -> Result<Option<TriggerSource>, TriggerError> {
        Ok(self.sources.get_active(flow_id, simulate).await?)
    }

    pub async fn exists_by_flow_id(&self, flow_id: &FlowId, simulate: bool) -> Result<bool, TriggerError> {
        Ok(self.get_by_flow_id(flow_id, simulate).await?.is_some())
    }

    pub async fn list_active_polling(&self) -> Result<Vec<TriggerSource>, TriggerError> {
        Ok(self.sources.list_active_polling().await?)
    }
}
