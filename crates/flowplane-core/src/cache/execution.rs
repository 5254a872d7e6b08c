//! Read-through cache of flow execution snapshots.
//!
//! The run path reads snapshots from here instead of the database. Every
//! lifecycle change invalidates the entry. Cache failures are logged and
//! never surface to callers: a read falls back to the database and a failed
//! invalidation is tolerated.

use std::time::Duration;

use flowplane_types::error::FlowError;
use flowplane_types::execution::FlowExecutionSnapshot;
use flowplane_types::flow::FlowId;

use crate::repository::flow::FlowRepository;
use crate::repository::trigger_source::TriggerSourceRepository;

use super::CacheBackend;

pub struct ExecutionCache<C: CacheBackend> {
    backend: C,
    ttl: Duration,
    platform_id: String,
}

impl<C: CacheBackend> ExecutionCache<C> {
    pub fn new(backend: C, ttl: Duration, platform_id: impl Into<String>) -> Self {
        Self {
            backend,
            ttl,
            platform_id: platform_id.into(),
        }
    }

    fn key(flow_id: &FlowId) -> String {
        format!("flow-execution:{flow_id}")
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    /// Cached snapshot for a flow, building and storing it on a miss.
    ///
    /// Returns `None` when the flow does not exist.
    pub async fn get<F, S>(
        &self,
        flow_id: &FlowId,
        flows: &F,
        sources: &S,
    ) -> Result<Option<FlowExecutionSnapshot>, FlowError>
    where
        F: FlowRepository,
        S: TriggerSourceRepository,
    {
        let key = Self::key(flow_id);
        match self.backend.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => tracing::warn!(%flow_id, error = %e, "discarding unreadable cached snapshot"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(%flow_id, error = %e, "execution cache read failed"),
        }

        let Some(flow) = flows.get_flow(flow_id).await? else {
            return Ok(None);
        };
        let published_version = match &flow.published_version_id {
            Some(version_id) => flows.get_version(version_id).await?,
            None => None,
        };
        let handshake = sources
            .get_active(flow_id, false)
            .await?
            .and_then(|source| source.handshake);

        let snapshot = FlowExecutionSnapshot {
            flow,
            published_version,
            handshake,
            platform_id: self.platform_id.clone(),
        };

        match serde_json::to_value(&snapshot) {
            Ok(value) => {
                if let Err(e) = self.backend.put(&key, value, self.ttl).await {
                    tracing::warn!(%flow_id, error = %e, "execution cache write failed");
                }
            }
            Err(e) => tracing::warn!(%flow_id, error = %e, "failed to serialize snapshot"),
        }

        Ok(Some(snapshot))
    }

    /// Drop the cached snapshot. Failures are logged only.
    pub async fn invalidate(&self, flow_id: &FlowId) {
        if let Err(e) = self.backend.delete(&Self::key(flow_id)).await {
            tracing::warn!(%flow_id, error = %e, "execution cache invalidation failed");
        } else {
            tracing::debug!(%flow_id, "execution cache invalidated");
        }
    }
}
