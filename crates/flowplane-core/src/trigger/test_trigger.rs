//! Test trigger sessions used by the flow editor.
//!
//! Starting a session either polls the trigger once through the piece's test
//! hook or registers a simulate webhook that waits for a real event. Every
//! step runs under the `{flow_id}-test-trigger` lock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use flowplane_types::error::FlowError;
use flowplane_types::event::FlowEvent;
use flowplane_types::flow::FlowId;
use flowplane_types::trigger::{TestTriggerSession, TriggerSourceType};

use crate::event::EventBus;
use crate::lock::{LockGuard, LockService};
use crate::repository::flow::FlowRepository;
use crate::repository::trigger_source::TriggerSourceRepository;
use crate::storage::FlowStore;
use crate::storage::flow_store::SAMPLE_DATA_KEY;

use super::manager::TriggerSourceManager;
use super::polling::PollingService;

pub struct TestTriggerService<F, S, K, L>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    L: LockService,
{
    flows: Arc<F>,
    triggers: Arc<TriggerSourceManager<S, K>>,
    polling: Arc<PollingService<K>>,
    store: Arc<K>,
    locks: Arc<L>,
    events: EventBus,
    lock_timeout: Duration,
    sample_limit: usize,
}

impl<F, S, K, L> TestTriggerService<F, S, K, L>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
    L: LockService,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flows: Arc<F>,
        triggers: Arc<TriggerSourceManager<S, K>>,
        polling: Arc<PollingService<K>>,
        store: Arc<K>,
        locks: Arc<L>,
        events: EventBus,
        lock_timeout: Duration,
        sample_limit: usize,
    ) -> Self {
        Self {
            flows,
            triggers,
            polling,
            store,
            locks,
            events,
            lock_timeout,
            sample_limit,
        }
    }

    async fn lock(&self, flow_id: &FlowId) -> Result<LockGuard, FlowError> {
        let key = format!("{flow_id}-test-trigger");
        Ok(self.locks.acquire(&key, self.lock_timeout).await?)
    }

    /// Start a test session on the flow's current version.
    pub async fn start(&self, flow_id: &FlowId, project_id: &str) -> Result<TestTriggerSession, FlowError> {
        let guard = self.lock(flow_id).await?;

        let version = self
            .flows
            .get_latest_version(flow_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("flow {flow_id}")))?;
        let definition = self.triggers.resolve(&version).await?;

        self.triggers.disable(flow_id, project_id, true, true).await?;

        let session = if definition.trigger_type == TriggerSourceType::Polling {
            let items = self
                .polling
                .test_sample(&version, project_id, self.sample_limit)
                .await?;
            if let Some(first) = items.first() {
                self.store.put(flow_id, SAMPLE_DATA_KEY, first).await?;
            }
            tracing::info!(%flow_id, samples = items.len(), "test poll complete");
            TestTriggerSession::Sampled { items }
        } else {
            let source = self.triggers.enable(&version, project_id, true).await?;
            tracing::info!(%flow_id, source_id = %source.id, "listening for test event");
            TestTriggerSession::Listening { source }
        };

        guard.release();
        Ok(session)
    }

    /// Withdraw the simulate registration, ignoring engine errors.
    pub async fn cancel(&self, flow_id: &FlowId, project_id: &str) -> Result<(), FlowError> {
        let guard = self.lock(flow_id).await?;
        self.triggers.disable(flow_id, project_id, true, true).await?;
        guard.release();
        Ok(())
    }

    /// Record the first event received by a simulate registration and end the
    /// session. `NotFound` when no session is listening.
    pub async fn capture_sample(
        &self,
        flow_id: &FlowId,
        project_id: &str,
        payload: Value,
    ) -> Result<(), FlowError> {
        let guard = self.lock(flow_id).await?;

        if !self.triggers.exists_by_flow_id(flow_id, true).await? {
            return Err(FlowError::NotFound(format!("test trigger session for flow {flow_id}")));
        }
        self.store.put(flow_id, SAMPLE_DATA_KEY, &payload).await?;
        self.triggers.disable(flow_id, project_id, true, true).await?;
        self.events.publish(FlowEvent::TestTriggerSampleCaptured {
            project_id: project_id.to_string(),
            flow_id: *flow_id,
            sample: payload,
        });

        guard.release();
        Ok(())
    }

    /// The last captured sample, if any.
    pub async fn sample(&self, flow_id: &FlowId) -> Result<Option<Value>, FlowError> {
        Ok(self.store.get(flow_id, SAMPLE_DATA_KEY).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BoxTriggerEngine;
    use crate::lock::InMemoryLockService;
    use crate::testing::{
        FakeTriggerEngine, MemoryFlowRepository, MemoryFlowStore, MemoryTriggerSourceRepository,
        piece_version,
    };
    use flowplane_types::flow::Flow;
    use serde_json::json;

    type Service = TestTriggerService<
        MemoryFlowRepository,
        MemoryTriggerSourceRepository,
        MemoryFlowStore,
        InMemoryLockService,
    >;

    struct Fixture {
        engine: FakeTriggerEngine,
        sources: Arc<MemoryTriggerSourceRepository>,
        locks: Arc<InMemoryLockService>,
        events: EventBus,
        service: Service,
        flow: Flow,
    }

    async fn fixture(trigger_type: TriggerSourceType) -> Fixture {
        let engine = FakeTriggerEngine::new(trigger_type);
        let boxed = Arc::new(BoxTriggerEngine::new(engine.clone()));
        let flows = Arc::new(MemoryFlowRepository::default());
        let sources = Arc::new(MemoryTriggerSourceRepository::default());
        let store = Arc::new(MemoryFlowStore::default());
        let locks = Arc::new(InMemoryLockService::new());
        let events = EventBus::new(16);

        let flow = Flow::new("p", None);
        flows
            .create_flow_with_version(&flow, &piece_version(flow.id))
            .await
            .unwrap();

        let triggers = Arc::new(TriggerSourceManager::new(sources.clone(), store.clone(), boxed.clone()));
        let polling = Arc::new(PollingService::new(store.clone(), boxed, events.clone(), 5));
        let service = TestTriggerService::new(
            flows,
            triggers,
            polling,
            store,
            locks.clone(),
            events.clone(),
            Duration::from_millis(50),
            5,
        );
        Fixture {
            engine,
            sources,
            locks,
            events,
            service,
            flow,
        }
    }

    #[tokio::test]
    async fn webhook_start_registers_simulate_source() {
        let f = fixture(TriggerSourceType::Webhook).await;
        let session = f.service.start(&f.flow.id, "p").await.unwrap();

        assert!(matches!(session, TestTriggerSession::Listening { ref source } if source.simulate));
        assert_eq!(f.sources.active_count(&f.flow.id, true), 1);
        assert_eq!(f.sources.active_count(&f.flow.id, false), 0);
    }

    #[tokio::test]
    async fn polling_start_returns_samples_and_stores_first() {
        let f = fixture(TriggerSourceType::Polling).await;
        f.engine.set_test_output(vec![json!({"id": 1}), json!({"id": 2})]);

        let session = f.service.start(&f.flow.id, "p").await.unwrap();
        assert!(matches!(session, TestTriggerSession::Sampled { ref items } if items.len() == 2));
        assert_eq!(f.service.sample(&f.flow.id).await.unwrap(), Some(json!({"id": 1})));
        assert_eq!(f.engine.register_calls(), 0);
    }

    #[tokio::test]
    async fn failed_test_releases_lock() {
        let f = fixture(TriggerSourceType::Polling).await;
        f.engine.fail_tests_with("bad auth");

        let err = f.service.start(&f.flow.id, "p").await.unwrap_err();
        assert_eq!(err.code(), "TEST_TRIGGER_FAILED");

        let key = format!("{}-test-trigger", f.flow.id);
        assert!(f.locks.acquire(&key, Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let f = fixture(TriggerSourceType::Webhook).await;
        let key = format!("{}-test-trigger", f.flow.id);
        let _held = f.locks.acquire(&key, Duration::from_millis(10)).await.unwrap();

        let err = f.service.cancel(&f.flow.id, "p").await.unwrap_err();
        assert_eq!(err.code(), "LOCK_TIMEOUT");
    }

    #[tokio::test]
    async fn capture_sample_ends_session_and_notifies() {
        let f = fixture(TriggerSourceType::Webhook).await;
        let mut rx = f.events.subscribe();
        f.service.start(&f.flow.id, "p").await.unwrap();

        f.service
            .capture_sample(&f.flow.id, "p", json!({"subject": "hi"}))
            .await
            .unwrap();

        assert_eq!(f.sources.active_count(&f.flow.id, true), 0);
        assert_eq!(f.service.sample(&f.flow.id).await.unwrap(), Some(json!({"subject": "hi"})));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "TEST_TRIGGER_SAMPLE_CAPTURED");
    }

    #[tokio::test]
    async fn capture_without_listening_session_is_rejected() {
        let f = fixture(TriggerSourceType::Webhook).await;
        let mut rx = f.events.subscribe();

        let err = f
            .service
            .capture_sample(&f.flow.id, "p", json!({"subject": "stray"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_FOUND");
        assert!(f.service.sample(&f.flow.id).await.unwrap().is_none());
        assert!(rx.try_recv().is_err());

        f.service.start(&f.flow.id, "p").await.unwrap();
        f.service.cancel(&f.flow.id, "p").await.unwrap();
        assert!(f.service.capture_sample(&f.flow.id, "p", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn cancel_ignores_engine_errors() {
        let f = fixture(TriggerSourceType::Webhook).await;
        f.service.start(&f.flow.id, "p").await.unwrap();
        f.engine.fail_next_unregisters(1);

        f.service.cancel(&f.flow.id, "p").await.unwrap();
        assert_eq!(f.sources.active_count(&f.flow.id, true), 0);
    }
}
