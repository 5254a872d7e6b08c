//! In-memory fakes of the storage and engine ports for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use flowplane_types::error::{EngineError, RepositoryError};
use flowplane_types::flow::{
    Flow, FlowId, FlowOperationStatus, FlowStatus, FlowTrigger, FlowVersion, FlowVersionId,
    FlowVersionState, PieceTrigger,
};
use flowplane_types::trigger::{
    PieceTriggerDefinition, PollRequest, PollingItem, TestTriggerOutcome, TriggerRegistration,
    TriggerSource, TriggerSourceType,
};

use crate::engine::TriggerEngine;
use crate::repository::flow::FlowRepository;
use crate::repository::trigger_source::TriggerSourceRepository;
use crate::storage::FlowStore;

/// A valid draft whose trigger is `@pieces/gmail:new_email`.
pub fn piece_version(flow_id: FlowId) -> FlowVersion {
    let mut version = FlowVersion::empty_draft(flow_id, "Sync inbox");
    version.trigger = FlowTrigger::Piece(PieceTrigger {
        piece_name: "@pieces/gmail".to_string(),
        piece_version: "0.3.1".to_string(),
        trigger_name: "new_email".to_string(),
        input: json!({}),
    });
    version.recompute_validity();
    version
}

/// Decrement a failure budget, returning whether this call should fail.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFlowRepository {
    flows: RwLock<HashMap<FlowId, Flow>>,
    versions: RwLock<Vec<FlowVersion>>,
    delete_calls: AtomicUsize,
    fail_deletes: AtomicUsize,
}

impl MemoryFlowRepository {
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }

    pub fn version_count(&self, flow_id: &FlowId) -> usize {
        self.versions
            .read()
            .unwrap()
            .iter()
            .filter(|v| v.flow_id == *flow_id)
            .count()
    }
}

impl FlowRepository for MemoryFlowRepository {
    async fn create_flow_with_version(&self, flow: &Flow, version: &FlowVersion) -> Result<(), RepositoryError> {
        self.flows.write().unwrap().insert(flow.id, flow.clone());
        self.versions.write().unwrap().push(version.clone());
        Ok(())
    }

    async fn get_flow(&self, id: &FlowId) -> Result<Option<Flow>, RepositoryError> {
        Ok(self.flows.read().unwrap().get(id).cloned())
    }

    async fn list_flows(&self, project_id: &str) -> Result<Vec<Flow>, RepositoryError> {
        let mut flows: Vec<_> = self
            .flows
            .read()
            .unwrap()
            .values()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect();
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(flows)
    }

    async fn update_folder(&self, id: &FlowId, folder_id: Option<&str>) -> Result<(), RepositoryError> {
        let mut flows = self.flows.write().unwrap();
        let flow = flows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        flow.folder_id = folder_id.map(str::to_string);
        flow.updated_at = Utc::now();
        Ok(())
    }

    async fn update_metadata(&self, id: &FlowId, metadata: Option<&Value>) -> Result<(), RepositoryError> {
        let mut flows = self.flows.write().unwrap();
        let flow = flows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        flow.metadata = metadata.cloned();
        flow.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_operation(
        &self,
        id: &FlowId,
        expected: FlowOperationStatus,
        new: FlowOperationStatus,
    ) -> Result<bool, RepositoryError> {
        let mut flows = self.flows.write().unwrap();
        let flow = flows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if flow.operation_status != expected {
            return Ok(false);
        }
        flow.operation_status = new;
        flow.updated_at = Utc::now();
        Ok(true)
    }

    async fn finish_operation(
        &self,
        id: &FlowId,
        status: Option<FlowStatus>,
    ) -> Result<Option<Flow>, RepositoryError> {
        let mut flows = self.flows.write().unwrap();
        Ok(flows.get_mut(id).map(|flow| {
            flow.operation_status = FlowOperationStatus::None;
            if let Some(status) = status {
                flow.status = status;
            }
            flow.updated_at = Utc::now();
            flow.clone()
        }))
    }

    async fn delete_flow_cascade(&self, id: &FlowId) -> Result<bool, RepositoryError> {
        if take_failure(&self.fail_deletes) {
            return Err(RepositoryError::Query("database is locked".to_string()));
        }
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.versions.write().unwrap().retain(|v| v.flow_id != *id);
        Ok(self.flows.write().unwrap().remove(id).is_some())
    }

    async fn get_version(&self, id: &FlowVersionId) -> Result<Option<FlowVersion>, RepositoryError> {
        Ok(self.versions.read().unwrap().iter().find(|v| v.id == *id).cloned())
    }

    async fn get_latest_version(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, RepositoryError> {
        Ok(self
            .versions
            .read()
            .unwrap()
            .iter()
            .rev()
            .find(|v| v.flow_id == *flow_id)
            .cloned())
    }

    async fn save_version(&self, version: &FlowVersion) -> Result<(), RepositoryError> {
        let mut versions = self.versions.write().unwrap();
        match versions.iter_mut().find(|v| v.id == version.id) {
            Some(existing) if existing.is_locked() => {
                return Err(RepositoryError::Conflict(format!("version {} is locked", version.id)));
            }
            Some(existing) => {
                let state = existing.state;
                *existing = version.clone();
                existing.state = state;
            }
            None => versions.push(version.clone()),
        }
        Ok(())
    }

    async fn publish_version(&self, flow_id: &FlowId, version_id: &FlowVersionId) -> Result<Flow, RepositoryError> {
        {
            let mut versions = self.versions.write().unwrap();
            let version = versions
                .iter_mut()
                .find(|v| v.id == *version_id && v.flow_id == *flow_id)
                .ok_or(RepositoryError::NotFound)?;
            version.state = FlowVersionState::Locked;
        }
        let mut flows = self.flows.write().unwrap();
        let flow = flows.get_mut(flow_id).ok_or(RepositoryError::NotFound)?;
        flow.published_version_id = Some(*version_id);
        flow.updated_at = Utc::now();
        Ok(flow.clone())
    }
}

// ---------------------------------------------------------------------------
// Trigger sources
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTriggerSourceRepository {
    rows: RwLock<Vec<TriggerSource>>,
    fail_writes: AtomicUsize,
}

impl MemoryTriggerSourceRepository {
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn active_count(&self, flow_id: &FlowId, simulate: bool) -> usize {
        self.rows
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.flow_id == *flow_id && s.simulate == simulate && s.is_active())
            .count()
    }
}

impl TriggerSourceRepository for MemoryTriggerSourceRepository {
    async fn get_active(&self, flow_id: &FlowId, simulate: bool) -> Result<Option<TriggerSource>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .iter()
            .find(|s| s.flow_id == *flow_id && s.simulate == simulate && s.is_active())
            .cloned())
    }

    async fn replace_active(&self, source: &TriggerSource) -> Result<(), RepositoryError> {
        if take_failure(&self.fail_writes) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        let mut rows = self.rows.write().unwrap();
        let now = Utc::now();
        for row in rows
            .iter_mut()
            .filter(|s| s.flow_id == source.flow_id && s.simulate == source.simulate && s.is_active())
        {
            row.deleted_at = Some(now);
        }
        rows.push(source.clone());
        Ok(())
    }

    async fn soft_delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().unwrap();
        if let Some(row) = rows.iter_mut().find(|s| s.id == *id && s.is_active()) {
            row.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_active_polling(&self) -> Result<Vec<TriggerSource>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.is_active() && !s.simulate && s.is_polling())
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Flow store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFlowStore {
    entries: RwLock<HashMap<(FlowId, String), Value>>,
}

impl FlowStore for MemoryFlowStore {
    async fn get(&self, flow_id: &FlowId, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .get(&(*flow_id, key.to_string()))
            .cloned())
    }

    async fn put(&self, flow_id: &FlowId, key: &str, value: &Value) -> Result<(), RepositoryError> {
        self.entries
            .write()
            .unwrap()
            .insert((*flow_id, key.to_string()), value.clone());
        Ok(())
    }

    async fn delete(&self, flow_id: &FlowId, key: &str) -> Result<(), RepositoryError> {
        self.entries.write().unwrap().remove(&(*flow_id, key.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trigger engine
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeEngineState {
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    fail_registers: AtomicUsize,
    fail_unregisters: AtomicUsize,
    poll_batches: Mutex<VecDeque<Vec<PollingItem>>>,
    poll_requests: Mutex<Vec<PollRequest>>,
    test_output: Mutex<Vec<Value>>,
    test_failure: Mutex<Option<String>>,
}

/// Scriptable engine that counts calls. Clones share state.
#[derive(Clone)]
pub struct FakeTriggerEngine {
    trigger_type: TriggerSourceType,
    state: Arc<FakeEngineState>,
}

impl FakeTriggerEngine {
    pub fn new(trigger_type: TriggerSourceType) -> Self {
        Self {
            trigger_type,
            state: Arc::new(FakeEngineState::default()),
        }
    }

    pub fn register_calls(&self) -> usize {
        self.state.register_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.state.unregister_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_registers(&self, n: usize) {
        self.state.fail_registers.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_unregisters(&self, n: usize) {
        self.state.fail_unregisters.store(n, Ordering::SeqCst);
    }

    pub fn push_poll_batch(&self, items: Vec<PollingItem>) {
        self.state.poll_batches.lock().unwrap().push_back(items);
    }

    pub fn poll_requests(&self) -> Vec<PollRequest> {
        self.state.poll_requests.lock().unwrap().clone()
    }

    pub fn set_test_output(&self, output: Vec<Value>) {
        *self.state.test_output.lock().unwrap() = output;
    }

    pub fn fail_tests_with(&self, message: &str) {
        *self.state.test_failure.lock().unwrap() = Some(message.to_string());
    }
}

impl TriggerEngine for FakeTriggerEngine {
    async fn resolve_trigger(&self, version: &FlowVersion) -> Result<PieceTriggerDefinition, EngineError> {
        match &version.trigger {
            FlowTrigger::Piece(t) => Ok(PieceTriggerDefinition {
                piece_name: t.piece_name.clone(),
                piece_version: t.piece_version.clone(),
                trigger_name: t.trigger_name.clone(),
                trigger_type: self.trigger_type,
                handshake: None,
            }),
            FlowTrigger::Empty => Err(EngineError::Unsupported("empty trigger".to_string())),
        }
    }

    async fn register(
        &self,
        _version: &FlowVersion,
        _project_id: &str,
        _simulate: bool,
    ) -> Result<TriggerRegistration, EngineError> {
        if take_failure(&self.state.fail_registers) {
            return Err(EngineError::Unreachable("connection refused".to_string()));
        }
        self.state.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TriggerRegistration {
            trigger_type: self.trigger_type,
            schedule: None,
            handshake: None,
        })
    }

    async fn unregister(&self, _source: &TriggerSource) -> Result<(), EngineError> {
        if take_failure(&self.state.fail_unregisters) {
            return Err(EngineError::Unreachable("connection refused".to_string()));
        }
        self.state.unregister_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn poll(
        &self,
        _version: &FlowVersion,
        _project_id: &str,
        request: PollRequest,
    ) -> Result<Vec<PollingItem>, EngineError> {
        self.state.poll_requests.lock().unwrap().push(request);
        let batch = self.state.poll_batches.lock().unwrap().pop_front().unwrap_or_default();
        Ok(match request.max_items {
            Some(limit) => batch.into_iter().take(limit).collect(),
            None => batch,
        })
    }

    async fn test(&self, _version: &FlowVersion, _project_id: &str) -> Result<TestTriggerOutcome, EngineError> {
        if let Some(message) = self.state.test_failure.lock().unwrap().clone() {
            return Ok(TestTriggerOutcome {
                success: false,
                message: Some(message),
                output: Vec::new(),
            });
        }
        Ok(TestTriggerOutcome {
            success: true,
            message: None,
            output: self.state.test_output.lock().unwrap().clone(),
        })
    }
}
