//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both the CLI and the
//! REST API. Services are generic over storage ports; AppState pins them to
//! the SQLite and in-memory implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flowplane_core::cache::{ExecutionCache, InMemoryCache};
use flowplane_core::engine::BoxTriggerEngine;
use flowplane_core::event::EventBus;
use flowplane_core::lock::InMemoryLockService;
use flowplane_core::saga::{FlowJobHandler, JobWorker, PhaseRetry};
use flowplane_core::service::flow::{FlowService, LifecycleSettings};
use flowplane_core::trigger::{PollingScheduler, PollingService, TestTriggerService, TriggerSourceManager};
use flowplane_infra::config::{load_config, resolve_data_dir};
use flowplane_infra::engine::HttpTriggerEngine;
use flowplane_infra::sqlite::flow::SqliteFlowRepository;
use flowplane_infra::sqlite::flow_store::SqliteFlowStore;
use flowplane_infra::sqlite::job_queue::SqliteJobQueue;
use flowplane_infra::sqlite::pool::{DatabasePool, database_url};
use flowplane_infra::sqlite::trigger_source::SqliteTriggerSourceRepository;
use flowplane_types::config::ControlPlaneConfig;

/// Timeout for a single trigger engine request.
const ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

pub type ConcreteTriggerManager = TriggerSourceManager<SqliteTriggerSourceRepository, SqliteFlowStore>;

pub type ConcreteFlowService = FlowService<
    SqliteFlowRepository,
    SqliteTriggerSourceRepository,
    SqliteFlowStore,
    SqliteJobQueue,
    InMemoryCache,
>;

pub type ConcreteTestTriggerService = TestTriggerService<
    SqliteFlowRepository,
    SqliteTriggerSourceRepository,
    SqliteFlowStore,
    InMemoryLockService,
>;

pub type ConcreteJobHandler =
    FlowJobHandler<SqliteFlowRepository, SqliteTriggerSourceRepository, SqliteFlowStore, InMemoryCache>;

pub type ConcreteWorker = JobWorker<SqliteJobQueue, ConcreteJobHandler>;

pub type ConcretePollingScheduler =
    PollingScheduler<SqliteFlowRepository, SqliteTriggerSourceRepository, SqliteFlowStore>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub flow_service: Arc<ConcreteFlowService>,
    pub test_triggers: Arc<ConcreteTestTriggerService>,
    pub worker: Arc<ConcreteWorker>,
    pub scheduler: Arc<ConcretePollingScheduler>,
    pub flows: Arc<SqliteFlowRepository>,
    pub sources: Arc<SqliteTriggerSourceRepository>,
    pub queue: Arc<SqliteJobQueue>,
    pub cache: Arc<ExecutionCache<InMemoryCache>>,
    pub events: EventBus,
    pub config: ControlPlaneConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load `config.toml` and wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;
        Self::build(&data_dir, config).await
    }

    /// Wire every service against the database in `data_dir`.
    pub async fn build(data_dir: &Path, config: ControlPlaneConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&database_url(data_dir)).await?;

        let flows = Arc::new(SqliteFlowRepository::new(db_pool.clone()));
        let sources = Arc::new(SqliteTriggerSourceRepository::new(db_pool.clone()));
        let store = Arc::new(SqliteFlowStore::new(db_pool.clone()));
        let queue = Arc::new(SqliteJobQueue::new(db_pool.clone()));
        let locks = Arc::new(InMemoryLockService::new());
        let events = EventBus::default();

        let cache = Arc::new(ExecutionCache::new(
            InMemoryCache::new(),
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.platform_id.clone(),
        ));

        let engine = Arc::new(BoxTriggerEngine::new(HttpTriggerEngine::new(
            config.engine_url.clone(),
            ENGINE_TIMEOUT,
        )?));
        let triggers: Arc<ConcreteTriggerManager> =
            Arc::new(TriggerSourceManager::new(sources.clone(), store.clone(), engine.clone()));
        let polling = Arc::new(PollingService::new(
            store.clone(),
            engine,
            events.clone(),
            config.polling.first_poll_limit,
        ));

        let flow_service = FlowService::new(
            flows.clone(),
            triggers.clone(),
            queue.clone(),
            cache.clone(),
            LifecycleSettings::from_config(&config),
        );

        let test_triggers = TestTriggerService::new(
            flows.clone(),
            triggers.clone(),
            polling.clone(),
            store,
            locks,
            events.clone(),
            Duration::from_millis(config.locks.timeout_ms),
            config.polling.test_sample_limit,
        );

        let handler = FlowJobHandler::new(
            flows.clone(),
            triggers.clone(),
            cache.clone(),
            events.clone(),
            PhaseRetry::from_config(&config.phase_retry),
        );
        let worker = JobWorker::new(
            queue.clone(),
            Arc::new(handler),
            Duration::from_millis(config.queue.poll_interval_ms),
        );

        let scheduler = PollingScheduler::new(
            flows.clone(),
            triggers,
            polling,
            Duration::from_secs(config.polling.interval_secs),
        );

        Ok(Self {
            flow_service: Arc::new(flow_service),
            test_triggers: Arc::new(test_triggers),
            worker: Arc::new(worker),
            scheduler: Arc::new(scheduler),
            flows,
            sources,
            queue,
            cache,
            events,
            config,
            data_dir: data_dir.to_path_buf(),
        })
    }
}
