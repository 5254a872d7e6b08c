use thiserror::Error;

/// Errors returned by the flow lifecycle and test trigger operations.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow {0} already has an operation in progress")]
    OperationInProgress(String),

    #[error("flow is being edited by another user")]
    InUse,

    #[error("{0} not found")]
    NotFound(String),

    #[error("test trigger failed: {0}")]
    TestTriggerFailed(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("timed out acquiring lock '{0}'")]
    LockTimeout(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("trigger engine error: {0}")]
    Engine(String),

    #[error("queue error: {0}")]
    Queue(String),
}

impl FlowError {
    /// Stable machine-readable code, used in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::OperationInProgress(_) => "FLOW_OPERATION_IN_PROGRESS",
            FlowError::InUse => "FLOW_IN_USE",
            FlowError::NotFound(_) => "ENTITY_NOT_FOUND",
            FlowError::TestTriggerFailed(_) => "TEST_TRIGGER_FAILED",
            FlowError::Validation(_) => "VALIDATION_ERROR",
            FlowError::LockTimeout(_) => "LOCK_TIMEOUT",
            FlowError::Storage(_) => "STORAGE_ERROR",
            FlowError::Engine(_) => "ENGINE_ERROR",
            FlowError::Queue(_) => "QUEUE_ERROR",
        }
    }
}

/// Errors from repository operations (used by trait definitions in flowplane-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the trigger engine gateway.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("trigger engine unreachable: {0}")]
    Unreachable(String),

    #[error("trigger engine rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid trigger engine response: {0}")]
    InvalidResponse(String),

    #[error("trigger not supported: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// Network failures and 5xx answers are worth retrying; the rest are not.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Unreachable(_) => true,
            EngineError::Rejected { status, .. } => *status >= 500 || *status == 429,
            EngineError::InvalidResponse(_) | EngineError::Unsupported(_) => false,
        }
    }
}

/// Errors from the durable job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid job payload: {0}")]
    Payload(String),
}

/// Errors from the lock service.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {timeout_ms}ms acquiring lock '{key}'")]
    Timeout { key: String, timeout_ms: u64 },

    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Errors from the cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl From<RepositoryError> for FlowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => FlowError::NotFound("entity".to_string()),
            other => FlowError::Storage(other.to_string()),
        }
    }
}

impl From<EngineError> for FlowError {
    fn from(err: EngineError) -> Self {
        FlowError::Engine(err.to_string())
    }
}

impl From<QueueError> for FlowError {
    fn from(err: QueueError) -> Self {
        FlowError::Queue(err.to_string())
    }
}

impl From<LockError> for FlowError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { key, .. } => FlowError::LockTimeout(key),
            LockError::Backend(msg) => FlowError::Storage(msg),
        }
    }
}
