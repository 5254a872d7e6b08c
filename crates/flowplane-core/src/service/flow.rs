//! Flow lifecycle service.
//!
//! Owns the flow / flow version state machine. Publishing, status changes and
//! deletion claim the flow's `operation_status`, enqueue a job and return;
//! the job performs the side effects and settles the final status. Folder,
//! metadata and structural edits are applied synchronously.

use std::sync::Arc;

use chrono::Utc;

use flowplane_types::config::ControlPlaneConfig;
use flowplane_types::error::{FlowError, RepositoryError};
use flowplane_types::flow::{
    CreateFlowRequest, Flow, FlowEdit, FlowId, FlowOperation, FlowOperationStatus, FlowStatus,
    FlowVersion, PopulatedFlow,
};
use flowplane_types::job::{
    BackoffPolicy, DeleteFlowJob, JobData, JobId, JobRequest, JobState, UpdateFlowStatusJob,
    UpsertOutcome,
};

use crate::cache::{CacheBackend, ExecutionCache};
use crate::queue::JobQueue;
use crate::repository::flow::FlowRepository;
use crate::repository::trigger_source::TriggerSourceRepository;
use crate::storage::FlowStore;
use crate::trigger::TriggerSourceManager;

/// Tunables for lifecycle jobs and the concurrent-edit guard.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub edit_lock_window: chrono::Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &ControlPlaneConfig) -> Self {
        Self {
            max_attempts: config.queue.max_attempts,
            backoff: BackoffPolicy::Exponential {
                delay_ms: config.queue.backoff_base_ms,
            },
            edit_lock_window: chrono::Duration::seconds(config.edit_lock_window_secs as i64),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&ControlPlaneConfig::default())
    }
}

/// Service orchestrating the flow lifecycle.
///
/// Generic over the storage ports so flowplane-core never depends on
/// flowplane-infra.
pub struct FlowService<F, S, K, Q, C>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    Q: JobQueue,
    C: CacheBackend,
{
    flows: Arc<F>,
    triggers: Arc<TriggerSourceManager<S, K>>,
    queue: Arc<Q>,
    cache: Arc<ExecutionCache<C>>,
    settings: LifecycleSettings,
}

impl<F, S, K, Q, C> FlowService<F, S, K, Q, C>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    Q: JobQueue,
    C: CacheBackend,
{
    pub fn new(
        flows: Arc<F>,
        triggers: Arc<TriggerSourceManager<S, K>>,
        queue: Arc<Q>,
        cache: Arc<ExecutionCache<C>>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            flows,
            triggers,
            queue,
            cache,
            settings,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    async fn load_flow(&self, flow_id: &FlowId) -> Result<Flow, FlowError> {
        self.flows
            .get_flow(flow_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("flow {flow_id}")))
    }

    async fn load_current_version(&self, flow_id: &FlowId) -> Result<FlowVersion, FlowError> {
        self.flows
            .get_latest_version(flow_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("version of flow {flow_id}")))
    }

    /// A flow joined with its current version.
    pub async fn get(&self, flow_id: &FlowId) -> Result<PopulatedFlow, FlowError> {
        let flow = self.load_flow(flow_id).await?;
        let version = self.load_current_version(flow_id).await?;
        Ok(PopulatedFlow { flow, version })
    }

    pub async fn list(&self, project_id: &str) -> Result<Vec<Flow>, FlowError> {
        Ok(self.flows.list_flows(project_id).await?)
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Create a disabled flow with an empty draft.
    pub async fn create(&self, request: CreateFlowRequest) -> Result<PopulatedFlow, FlowError> {
        let display_name = request.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(FlowError::Validation("display name cannot be empty".to_string()));
        }
        if request.project_id.trim().is_empty() {
            return Err(FlowError::Validation("project id cannot be empty".to_string()));
        }

        let flow = Flow::new(request.project_id, request.folder_id);
        let version = FlowVersion::empty_draft(flow.id, display_name);
        self.flows.create_flow_with_version(&flow, &version).await?;

        tracing::info!(flow_id = %flow.id, project_id = %flow.project_id, "flow created");
        Ok(PopulatedFlow { flow, version })
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Apply an operation to a flow and return its new state.
    ///
    /// Lifecycle operations return with `operation_status` set to the
    /// in-flight marker; the background job settles the final status.
    pub async fn update(
        &self,
        flow_id: &FlowId,
        user_id: Option<&str>,
        operation: FlowOperation,
    ) -> Result<PopulatedFlow, FlowError> {
        let flow = self.load_flow(flow_id).await?;
        if flow.operation_status == FlowOperationStatus::Deleting {
            return Err(FlowError::OperationInProgress(flow_id.to_string()));
        }

        tracing::debug!(%flow_id, operation = operation.name(), "updating flow");

        match operation {
            FlowOperation::LockAndPublish { status } => {
                let target = status.unwrap_or(FlowStatus::Enabled);
                self.start_transition(&flow, true, target).await?;
            }
            FlowOperation::ChangeStatus { status } => {
                self.start_transition(&flow, false, status).await?;
            }
            FlowOperation::ChangeFolder { folder_id } => {
                self.flows.update_folder(flow_id, folder_id.as_deref()).await?;
            }
            FlowOperation::UpdateMetadata { metadata } => {
                self.flows.update_metadata(flow_id, metadata.as_ref()).await?;
            }
            FlowOperation::Edit(edit) => {
                self.apply_edit(&flow, user_id, edit).await?;
            }
        }

        self.cache.invalidate(flow_id).await;
        self.get(flow_id).await
    }

    /// Claim the flow for a status transition, prepare it, and enqueue the
    /// job that completes it. The claim is released if anything fails before
    /// the job is queued.
    async fn start_transition(&self, flow: &Flow, publish: bool, target: FlowStatus) -> Result<(), FlowError> {
        let marker = target.transition_marker();
        let claimed = self
            .flows
            .claim_operation(&flow.id, FlowOperationStatus::None, marker)
            .await?;
        if !claimed {
            return Err(FlowError::OperationInProgress(flow.id.to_string()));
        }

        if let Err(e) = self.prepare_transition(flow, publish, target).await {
            tracing::warn!(flow_id = %flow.id, error = %e, "releasing operation claim");
            if let Err(release_err) = self.flows.finish_operation(&flow.id, None).await {
                tracing::error!(flow_id = %flow.id, error = %release_err, "failed to release operation claim");
            }
            return Err(e);
        }

        tracing::info!(flow_id = %flow.id, %target, publish, "status transition queued");
        Ok(())
    }

    async fn prepare_transition(&self, flow: &Flow, publish: bool, target: FlowStatus) -> Result<(), FlowError> {
        self.ensure_job_released(flow, &JobId::update_flow_status(&flow.id)).await?;

        if publish {
            let draft = self.load_current_version(&flow.id).await?;
            if !draft.valid {
                return Err(FlowError::Validation(
                    "flow version is not valid: trigger is not configured".to_string(),
                ));
            }
            if flow.status == FlowStatus::Enabled && flow.published_version_id.is_some() {
                self.triggers.disable(&flow.id, &flow.project_id, false, false).await?;
            }
            self.flows.publish_version(&flow.id, &draft.id).await?;
        } else if target == FlowStatus::Enabled && flow.published_version_id.is_none() {
            return Err(FlowError::Validation(
                "flow has no published version to enable".to_string(),
            ));
        }

        let data = JobData::UpdateFlowStatus(UpdateFlowStatusJob {
            flow_id: flow.id,
            project_id: flow.project_id.clone(),
            new_status: target,
            completed_phases: Default::default(),
        });
        self.enqueue(data).await
    }

    /// The previous job releases the flow before its queue row is removed.
    /// Until then an upsert under the same id would be swallowed, so the new
    /// transition is refused before any side effect runs.
    async fn ensure_job_released(&self, flow: &Flow, job_id: &JobId) -> Result<(), FlowError> {
        match self.queue.get(job_id).await? {
            Some(job) if job.state == JobState::Running => {
                tracing::debug!(flow_id = %flow.id, %job_id, "previous job still held by a worker");
                Err(FlowError::OperationInProgress(flow.id.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn enqueue(&self, data: JobData) -> Result<(), FlowError> {
        let flow_id = data.flow_id();
        let request = JobRequest::immediate(data, self.settings.backoff, self.settings.max_attempts);
        let job_id = request.job_id.clone();
        let outcome = self.queue.upsert(request).await?;
        if outcome == UpsertOutcome::IgnoredRunning {
            tracing::warn!(%job_id, "job already running, upsert ignored");
            return Err(FlowError::OperationInProgress(flow_id.to_string()));
        }
        tracing::debug!(%job_id, ?outcome, "job enqueued");
        Ok(())
    }

    /// Apply a structural edit to the flow's draft, forking a new draft when
    /// the current version is locked.
    async fn apply_edit(&self, flow: &Flow, user_id: Option<&str>, edit: FlowEdit) -> Result<(), FlowError> {
        let current = self.load_current_version(&flow.id).await?;

        if !current.is_locked() && self.edited_by_other_recently(&current, user_id) {
            return Err(FlowError::InUse);
        }

        let mut draft = if current.is_locked() {
            tracing::debug!(flow_id = %flow.id, locked = %current.id, "forking draft from locked version");
            current.clone_as_draft(user_id.map(str::to_string))
        } else {
            current
        };

        match edit {
            FlowEdit::ChangeName { display_name } => {
                let display_name = display_name.trim().to_string();
                if display_name.is_empty() {
                    return Err(FlowError::Validation("display name cannot be empty".to_string()));
                }
                draft.display_name = display_name;
            }
            FlowEdit::UpdateTrigger { trigger } => draft.trigger = trigger,
            FlowEdit::UpdateSteps { steps } => draft.steps = steps,
            FlowEdit::ImportFlow {
                display_name,
                trigger,
                steps,
            } => {
                draft.display_name = display_name;
                draft.trigger = trigger;
                draft.steps = steps;
            }
            FlowEdit::UseAsDraft { version_id } => {
                let source = self
                    .flows
                    .get_version(&version_id)
                    .await?
                    .filter(|v| v.flow_id == flow.id)
                    .ok_or_else(|| FlowError::NotFound(format!("flow version {version_id}")))?;
                draft.display_name = source.display_name;
                draft.trigger = source.trigger;
                draft.steps = source.steps;
            }
        }

        draft.updated_by = user_id.map(str::to_string);
        draft.updated_at = Utc::now();
        draft.recompute_validity();
        match self.flows.save_version(&draft).await {
            Ok(()) => Ok(()),
            // Locked by a publish that landed after the draft was read.
            Err(RepositoryError::Conflict(_)) => Err(FlowError::InUse),
            Err(e) => Err(e.into()),
        }
    }

    fn edited_by_other_recently(&self, version: &FlowVersion, user_id: Option<&str>) -> bool {
        let (Some(editor), Some(user)) = (version.updated_by.as_deref(), user_id) else {
            return false;
        };
        editor != user && Utc::now() - version.updated_at < self.settings.edit_lock_window
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Mark the flow DELETING and enqueue its removal.
    pub async fn delete(&self, flow_id: &FlowId) -> Result<Flow, FlowError> {
        let mut flow = self.load_flow(flow_id).await?;
        let claimed = self
            .flows
            .claim_operation(flow_id, FlowOperationStatus::None, FlowOperationStatus::Deleting)
            .await?;
        if !claimed {
            return Err(FlowError::OperationInProgress(flow_id.to_string()));
        }

        let data = JobData::DeleteFlow(DeleteFlowJob {
            flow_id: *flow_id,
            project_id: flow.project_id.clone(),
            completed_phases: Default::default(),
        });
        if let Err(e) = self.enqueue(data).await {
            if let Err(release_err) = self.flows.finish_operation(flow_id, None).await {
                tracing::error!(%flow_id, error = %release_err, "failed to release delete claim");
            }
            return Err(e);
        }

        tracing::info!(%flow_id, "flow deletion queued");
        flow.operation_status = FlowOperationStatus::Deleting;
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::InMemoryCache;
    use crate::engine::BoxTriggerEngine;
    use crate::queue::InMemoryJobQueue;
    use crate::testing::{
        FakeTriggerEngine, MemoryFlowRepository, MemoryFlowStore, MemoryTriggerSourceRepository,
        piece_version,
    };
    use flowplane_types::flow::{FlowTrigger, FlowVersionState, PieceTrigger};
    use flowplane_types::trigger::TriggerSourceType;
    use serde_json::json;

    type Service = FlowService<
        MemoryFlowRepository,
        MemoryTriggerSourceRepository,
        MemoryFlowStore,
        InMemoryJobQueue,
        InMemoryCache,
    >;

    struct Fixture {
        flows: Arc<MemoryFlowRepository>,
        queue: Arc<InMemoryJobQueue>,
        cache: Arc<ExecutionCache<InMemoryCache>>,
        engine: FakeTriggerEngine,
        triggers: Arc<TriggerSourceManager<MemoryTriggerSourceRepository, MemoryFlowStore>>,
        service: Service,
    }

    fn fixture() -> Fixture {
        let flows = Arc::new(MemoryFlowRepository::default());
        let queue = Arc::new(InMemoryJobQueue::new());
        let cache = Arc::new(ExecutionCache::new(InMemoryCache::new(), Duration::from_secs(60), "p"));
        let engine = FakeTriggerEngine::new(TriggerSourceType::Webhook);
        let triggers = Arc::new(TriggerSourceManager::new(
            Arc::new(MemoryTriggerSourceRepository::default()),
            Arc::new(MemoryFlowStore::default()),
            Arc::new(BoxTriggerEngine::new(engine.clone())),
        ));
        let service = FlowService::new(
            flows.clone(),
            triggers.clone(),
            queue.clone(),
            cache.clone(),
            LifecycleSettings::default(),
        );
        Fixture {
            flows,
            queue,
            cache,
            engine,
            triggers,
            service,
        }
    }

    fn create_request(name: &str) -> CreateFlowRequest {
        CreateFlowRequest {
            project_id: "proj-1".to_string(),
            display_name: name.to_string(),
            folder_id: None,
        }
    }

    fn gmail_trigger() -> FlowTrigger {
        piece_version(FlowId::new()).trigger
    }

    async fn publishable(f: &Fixture) -> FlowId {
        let created = f.service.create(create_request("Sync inbox")).await.unwrap();
        f.service
            .update(
                &created.flow.id,
                Some("user-1"),
                FlowOperation::Edit(FlowEdit::UpdateTrigger {
                    trigger: gmail_trigger(),
                }),
            )
            .await
            .unwrap();
        created.flow.id
    }

    #[tokio::test]
    async fn create_builds_disabled_flow_with_empty_draft() {
        let f = fixture();
        let created = f.service.create(create_request("  Sync inbox ")).await.unwrap();

        assert_eq!(created.flow.status, FlowStatus::Disabled);
        assert_eq!(created.flow.operation_status, FlowOperationStatus::None);
        assert_eq!(created.version.state, FlowVersionState::Draft);
        assert_eq!(created.version.display_name, "Sync inbox");
        assert_eq!(created.version.trigger, FlowTrigger::Empty);
        assert_eq!(f.service.list("proj-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let f = fixture();
        let err = f.service.create(create_request("   ")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn lock_and_publish_locks_version_and_enqueues_job() {
        let f = fixture();
        let flow_id = publishable(&f).await;

        let updated = f
            .service
            .update(&flow_id, Some("user-1"), FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();

        assert_eq!(updated.flow.operation_status, FlowOperationStatus::Enabling);
        assert_eq!(updated.flow.status, FlowStatus::Disabled);
        assert_eq!(updated.flow.published_version_id, Some(updated.version.id));
        assert_eq!(updated.version.state, FlowVersionState::Locked);

        let job = f.queue.get(&JobId::update_flow_status(&flow_id)).await.unwrap().unwrap();
        assert!(matches!(
            job.data,
            JobData::UpdateFlowStatus(UpdateFlowStatusJob { new_status: FlowStatus::Enabled, .. })
        ));
    }

    #[tokio::test]
    async fn change_status_while_busy_fails_and_enqueues_nothing_new() {
        let f = fixture();
        let flow_id = publishable(&f).await;
        f.service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();

        let err = f
            .service
            .update(
                &flow_id,
                None,
                FlowOperation::ChangeStatus {
                    status: FlowStatus::Disabled,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FLOW_OPERATION_IN_PROGRESS");

        let jobs = f.queue.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(matches!(
            jobs[0].data,
            JobData::UpdateFlowStatus(UpdateFlowStatusJob { new_status: FlowStatus::Enabled, .. })
        ));
    }

    #[tokio::test]
    async fn publishing_invalid_draft_releases_claim() {
        let f = fixture();
        let created = f.service.create(create_request("Empty")).await.unwrap();

        let err = f
            .service
            .update(&created.flow.id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let flow = f.flows.get_flow(&created.flow.id).await.unwrap().unwrap();
        assert_eq!(flow.operation_status, FlowOperationStatus::None);
        assert!(f.queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enabling_without_published_version_is_rejected() {
        let f = fixture();
        let flow_id = publishable(&f).await;
        let err = f
            .service
            .update(
                &flow_id,
                None,
                FlowOperation::ChangeStatus {
                    status: FlowStatus::Enabled,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let flow = f.flows.get_flow(&flow_id).await.unwrap().unwrap();
        assert!(!flow.is_busy());
    }

    #[tokio::test]
    async fn republishing_enabled_flow_unregisters_old_trigger_first() {
        let f = fixture();
        let flow_id = publishable(&f).await;
        f.service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();

        // Settle the first publish as if the job had run.
        let published = f.flows.get_latest_version(&flow_id).await.unwrap().unwrap();
        f.triggers.enable(&published, "proj-1", false).await.unwrap();
        f.flows.finish_operation(&flow_id, Some(FlowStatus::Enabled)).await.unwrap();
        f.queue.complete(&JobId::update_flow_status(&flow_id)).await.unwrap();

        f.service
            .update(
                &flow_id,
                Some("user-1"),
                FlowOperation::Edit(FlowEdit::UpdateSteps {
                    steps: json!([{"name": "step_1"}]),
                }),
            )
            .await
            .unwrap();
        let republished = f
            .service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();

        assert_eq!(f.engine.unregister_calls(), 1);
        assert_ne!(republished.flow.published_version_id, Some(published.id));
        assert!(!f.triggers.exists_by_flow_id(&flow_id, false).await.unwrap());
    }

    #[tokio::test]
    async fn failed_synchronous_unregister_is_returned_with_claim_released() {
        let f = fixture();
        let flow_id = publishable(&f).await;
        f.service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();
        let published = f.flows.get_latest_version(&flow_id).await.unwrap().unwrap();
        f.triggers.enable(&published, "proj-1", false).await.unwrap();
        f.flows.finish_operation(&flow_id, Some(FlowStatus::Enabled)).await.unwrap();

        f.engine.fail_next_unregisters(1);
        let err = f
            .service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENGINE_ERROR");

        let flow = f.flows.get_flow(&flow_id).await.unwrap().unwrap();
        assert_eq!(flow.operation_status, FlowOperationStatus::None);
        assert_eq!(flow.status, FlowStatus::Enabled);
    }

    #[tokio::test]
    async fn editing_locked_version_forks_new_draft() {
        let f = fixture();
        let flow_id = publishable(&f).await;
        let published = f
            .service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();
        let locked_id = published.version.id;

        let edited = f
            .service
            .update(
                &flow_id,
                Some("user-2"),
                FlowOperation::Edit(FlowEdit::ChangeName {
                    display_name: "Renamed".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_ne!(edited.version.id, locked_id);
        assert_eq!(edited.version.state, FlowVersionState::Draft);
        assert_eq!(edited.version.display_name, "Renamed");
        let locked = f.flows.get_version(&locked_id).await.unwrap().unwrap();
        assert_eq!(locked.display_name, "Sync inbox");
        assert_eq!(locked.state, FlowVersionState::Locked);
        assert_eq!(f.flows.version_count(&flow_id), 2);
    }

    #[tokio::test]
    async fn draft_locked_by_publish_rejects_late_save() {
        let f = fixture();
        let flow_id = publishable(&f).await;

        let mut stale = f.flows.get_latest_version(&flow_id).await.unwrap().unwrap();
        f.service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();
        stale.steps = json!([{"name": "late_edit"}]);

        let err = f.flows.save_version(&stale).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let locked = f.flows.get_version(&stale.id).await.unwrap().unwrap();
        assert_eq!(locked.state, FlowVersionState::Locked);
        assert_eq!(locked.steps, json!([]));

        // A fresh edit forks a new draft instead.
        let edited = f
            .service
            .update(
                &flow_id,
                Some("user-1"),
                FlowOperation::Edit(FlowEdit::UpdateSteps {
                    steps: json!([{"name": "step_1"}]),
                }),
            )
            .await
            .unwrap();
        assert_ne!(edited.version.id, stale.id);
        assert_eq!(f.flows.version_count(&flow_id), 2);
    }

    #[tokio::test]
    async fn concurrent_editor_gets_flow_in_use() {
        let f = fixture();
        let flow_id = publishable(&f).await;

        let err = f
            .service
            .update(
                &flow_id,
                Some("user-2"),
                FlowOperation::Edit(FlowEdit::UpdateSteps { steps: json!([]) }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FLOW_IN_USE");

        // The original editor can continue.
        f.service
            .update(
                &flow_id,
                Some("user-1"),
                FlowOperation::Edit(FlowEdit::UpdateSteps { steps: json!([]) }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn use_as_draft_copies_locked_structure() {
        let f = fixture();
        let flow_id = publishable(&f).await;
        let published = f
            .service
            .update(&flow_id, None, FlowOperation::LockAndPublish { status: None })
            .await
            .unwrap();

        let other_trigger = FlowTrigger::Piece(PieceTrigger {
            piece_name: "@pieces/slack".to_string(),
            piece_version: "1.0.0".to_string(),
            trigger_name: "new_message".to_string(),
            input: json!({}),
        });
        f.service
            .update(
                &flow_id,
                Some("user-1"),
                FlowOperation::Edit(FlowEdit::UpdateTrigger {
                    trigger: other_trigger,
                }),
            )
            .await
            .unwrap();

        let restored = f
            .service
            .update(
                &flow_id,
                Some("user-1"),
                FlowOperation::Edit(FlowEdit::UseAsDraft {
                    version_id: published.version.id,
                }),
            )
            .await
            .unwrap();
        assert_eq!(restored.version.trigger, published.version.trigger);
        assert_eq!(restored.version.state, FlowVersionState::Draft);
    }

    #[tokio::test]
    async fn delete_marks_deleting_and_blocks_updates() {
        let f = fixture();
        let created = f.service.create(create_request("Doomed")).await.unwrap();
        let flow_id = created.flow.id;

        let flow = f.service.delete(&flow_id).await.unwrap();
        assert_eq!(flow.operation_status, FlowOperationStatus::Deleting);
        assert!(f.queue.get(&JobId::delete_flow(&flow_id)).await.unwrap().is_some());

        let err = f
            .service
            .update(
                &flow_id,
                None,
                FlowOperation::ChangeFolder {
                    folder_id: Some("folder-9".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FLOW_OPERATION_IN_PROGRESS");

        let err = f.service.delete(&flow_id).await.unwrap_err();
        assert_eq!(err.code(), "FLOW_OPERATION_IN_PROGRESS");
    }

    #[tokio::test]
    async fn synchronous_updates_invalidate_cache() {
        let f = fixture();
        let created = f.service.create(create_request("Cached")).await.unwrap();
        let flow_id = created.flow.id;
        let sources = MemoryTriggerSourceRepository::default();

        f.cache.get(&flow_id, f.flows.as_ref(), &sources).await.unwrap();
        assert_eq!(f.cache.backend().len(), 1);

        f.service
            .update(
                &flow_id,
                None,
                FlowOperation::UpdateMetadata {
                    metadata: Some(json!({"owner": "ops"})),
                },
            )
            .await
            .unwrap();
        assert!(f.cache.backend().is_empty());

        let flow = f.flows.get_flow(&flow_id).await.unwrap().unwrap();
        assert_eq!(flow.metadata, Some(json!({"owner": "ops"})));
    }

    #[tokio::test]
    async fn missing_flow_is_not_found() {
        let f = fixture();
        let err = f.service.get(&FlowId::new()).await.unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_FOUND");
    }
}
