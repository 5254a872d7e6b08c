//! Handlers for the DELETE_FLOW and UPDATE_FLOW_STATUS jobs.

use std::sync::Arc;

use serde_json::Value;

use flowplane_types::event::{FlowEvent, OperationOutcome};
use flowplane_types::flow::{Flow, FlowStatus};
use flowplane_types::job::{DeleteFlowJob, JobData, JobEnvelope, SagaPhase, UpdateFlowStatusJob};

use crate::cache::{CacheBackend, ExecutionCache};
use crate::event::EventBus;
use crate::queue::JobQueue;
use crate::repository::flow::FlowRepository;
use crate::repository::trigger_source::TriggerSourceRepository;
use crate::storage::FlowStore;
use crate::trigger::TriggerSourceManager;

use super::{JobError, JobHandler, PhaseRetry};

const DELETE_PHASES: &[SagaPhase] = &[SagaPhase::PreDelete, SagaPhase::DbDelete];
const UPDATE_PHASES: &[SagaPhase] = &[SagaPhase::PreUpdate];

pub struct FlowJobHandler<F, S, K, C>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    C: CacheBackend,
{
    flows: Arc<F>,
    triggers: Arc<TriggerSourceManager<S, K>>,
    cache: Arc<ExecutionCache<C>>,
    events: EventBus,
    retry: PhaseRetry,
}

impl<F, S, K, C> FlowJobHandler<F, S, K, C>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    C: CacheBackend,
{
    pub fn new(
        flows: Arc<F>,
        triggers: Arc<TriggerSourceManager<S, K>>,
        cache: Arc<ExecutionCache<C>>,
        events: EventBus,
        retry: PhaseRetry,
    ) -> Self {
        Self {
            flows,
            triggers,
            cache,
            events,
            retry,
        }
    }

    async fn run_with_retry(&self, phase: SagaPhase, data: &JobData) -> Result<(), JobError> {
        let mut attempt = 1;
        loop {
            match self.run_phase(phase, data).await {
                Ok(()) => return Ok(()),
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    self.retry.log_retry(phase, attempt, &e);
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_phase(&self, phase: SagaPhase, data: &JobData) -> Result<(), JobError> {
        match (phase, data) {
            (SagaPhase::PreDelete, JobData::DeleteFlow(job)) => self.pre_delete(job).await,
            (SagaPhase::DbDelete, JobData::DeleteFlow(job)) => {
                let existed = self.flows.delete_flow_cascade(&job.flow_id).await?;
                tracing::debug!(flow_id = %job.flow_id, existed, "flow rows deleted");
                Ok(())
            }
            (SagaPhase::PreUpdate, JobData::UpdateFlowStatus(job)) => self.pre_update(job).await,
            (phase, data) => Err(JobError::Permanent(format!(
                "phase {phase} does not apply to {} jobs",
                data.kind()
            ))),
        }
    }

    /// Withdraw every registration of the flow. Production failures
    /// propagate; simulate failures are ignored.
    async fn pre_delete(&self, job: &DeleteFlowJob) -> Result<(), JobError> {
        self.cache.invalidate(&job.flow_id).await;
        self.triggers
            .disable(&job.flow_id, &job.project_id, false, false)
            .await?;
        self.triggers
            .disable(&job.flow_id, &job.project_id, true, true)
            .await?;
        Ok(())
    }

    /// Bring the production registration in line with the requested status.
    async fn pre_update(&self, job: &UpdateFlowStatusJob) -> Result<(), JobError> {
        let flow = self
            .flows
            .get_flow(&job.flow_id)
            .await?
            .ok_or_else(|| JobError::Permanent(format!("flow {} no longer exists", job.flow_id)))?;

        match job.new_status {
            FlowStatus::Enabled => {
                let version_id = flow
                    .published_version_id
                    .ok_or_else(|| JobError::Permanent("flow has no published version".to_string()))?;
                let version = self.flows.get_version(&version_id).await?.ok_or_else(|| {
                    JobError::Permanent(format!("published version {version_id} not found"))
                })?;

                self.triggers
                    .disable(&job.flow_id, &job.project_id, false, false)
                    .await?;
                self.triggers.enable(&version, &job.project_id, false).await?;
            }
            FlowStatus::Disabled => {
                self.triggers
                    .disable(&job.flow_id, &job.project_id, false, false)
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish(&self, data: &JobData) -> Result<(), JobError> {
        match data {
            JobData::DeleteFlow(job) => {
                self.cache.invalidate(&job.flow_id).await;
                tracing::info!(flow_id = %job.flow_id, "flow deleted");
                self.events.publish(FlowEvent::FlowDeleted {
                    project_id: job.project_id.clone(),
                    flow_id: job.flow_id,
                });
            }
            JobData::UpdateFlowStatus(job) => {
                let settled = self
                    .flows
                    .finish_operation(&job.flow_id, Some(job.new_status))
                    .await?;
                self.cache.invalidate(&job.flow_id).await;
                match settled {
                    Some(flow) => {
                        tracing::info!(flow_id = %job.flow_id, status = %job.new_status, "flow status updated");
                        self.events.publish(FlowEvent::FlowStatusUpdated {
                            project_id: job.project_id.clone(),
                            flow,
                            status: OperationOutcome::Success,
                            error: None,
                            trigger: None,
                        });
                    }
                    None => tracing::warn!(flow_id = %job.flow_id, "flow vanished before status settled"),
                }
            }
        }
        Ok(())
    }

    async fn published_trigger(&self, flow: &Flow) -> Option<Value> {
        let version_id = flow.published_version_id?;
        let version = self.flows.get_version(&version_id).await.ok().flatten()?;
        serde_json::to_value(&version.trigger).ok()
    }
}

impl<F, S, K, C> JobHandler for FlowJobHandler<F, S, K, C>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    C: CacheBackend,
{
    async fn handle<Q: JobQueue>(&self, job: &mut JobEnvelope, queue: &Q) -> Result<(), JobError> {
        let phases = match &job.data {
            JobData::DeleteFlow(_) => DELETE_PHASES,
            JobData::UpdateFlowStatus(_) => UPDATE_PHASES,
        };

        for &phase in phases {
            if job.data.is_completed(phase) {
                tracing::debug!(job_id = %job.job_id, %phase, "phase already completed, skipping");
                continue;
            }
            self.run_with_retry(phase, &job.data).await?;
            job.data.mark_completed(phase);
            queue.save_progress(&job.job_id, &job.data).await?;
            tracing::debug!(job_id = %job.job_id, %phase, "phase completed");
        }

        self.finish(&job.data).await
    }

    /// Release the flow: `operation_status` returns to NONE and subscribers
    /// are told the operation failed. `status` keeps its prior value unless a
    /// delete already withdrew the production trigger, in which case the flow
    /// is settled DISABLED.
    async fn on_exhausted(&self, job: &JobEnvelope, error: &JobError) {
        let flow_id = job.data.flow_id();
        let settled = match &job.data {
            JobData::DeleteFlow(_) if job.data.is_completed(SagaPhase::PreDelete) => {
                Some(FlowStatus::Disabled)
            }
            _ => None,
        };
        match self.flows.finish_operation(&flow_id, settled).await {
            Ok(Some(flow)) => {
                self.cache.invalidate(&flow_id).await;
                let trigger = self.published_trigger(&flow).await;
                tracing::error!(%flow_id, job_id = %job.job_id, error = %error, "lifecycle job failed, flow released");
                self.events.publish(FlowEvent::FlowStatusUpdated {
                    project_id: job.data.project_id().to_string(),
                    flow,
                    status: OperationOutcome::Failed,
                    error: Some(error.to_string()),
                    trigger,
                });
            }
            Ok(None) => {
                tracing::warn!(%flow_id, job_id = %job.job_id, "lifecycle job failed after flow was removed");
            }
            Err(e) => {
                tracing::error!(%flow_id, job_id = %job.job_id, error = %e, "compensation failed");
            }
        }
    }
}
